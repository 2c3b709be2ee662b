use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// how long to pause after a throttled response, derived from the
/// rate-limit headers the big repositories send: `x-ratelimit-*`
/// (Zenodo-style) or `ratelimit-*` (Dryad-style). with fewer than two
/// requests remaining, or on a 429, wait until the advertised reset;
/// without any headers a 429 backs off a full minute.
pub fn wait_duration(headers: &HeaderMap, status: u16, now_epoch: u64) -> Duration {
    let zenodo = header_pair(headers, "x-ratelimit-remaining", "x-ratelimit-reset");
    let dryad = header_pair(headers, "ratelimit-remaining", "ratelimit-reset");

    let pair = zenodo.or(dryad);
    match pair {
        Some((remaining, reset)) => {
            if remaining < 2 || status == 429 {
                Duration::from_secs(reset.saturating_sub(now_epoch).max(1))
            } else {
                Duration::from_secs(1)
            }
        }
        None => {
            if status == 429 {
                Duration::from_secs(60)
            } else {
                Duration::from_secs(1)
            }
        }
    }
}

/// sleeps for the computed wait. runs on the worker task only, so other
/// downloads keep going.
pub async fn throttle(headers: &HeaderMap, status: u16) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let wait = wait_duration(headers, status, now);
    log::info!("rate limited, sleeping {} s", wait.as_secs());
    tokio::time::sleep(wait).await;
}

fn header_pair(headers: &HeaderMap, remaining_key: &str, reset_key: &str) -> Option<(i64, u64)> {
    let remaining: i64 = headers.get(remaining_key)?.to_str().ok()?.trim().parse().ok()?;
    let reset: u64 = headers.get(reset_key)?.to_str().ok()?.trim().parse().ok()?;
    Some((remaining, reset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (key, value) in pairs {
            map.insert(
                HeaderName::from_static(key),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn no_headers_429_waits_a_minute() {
        assert_eq!(
            wait_duration(&HeaderMap::new(), 429, 1000),
            Duration::from_secs(60)
        );
        assert_eq!(
            wait_duration(&HeaderMap::new(), 200, 1000),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn zenodo_style_reset_is_honored_when_remaining_is_low() {
        let h = headers(&[
            ("x-ratelimit-remaining", String::from("1")),
            ("x-ratelimit-reset", String::from("1030")),
        ]);
        assert_eq!(wait_duration(&h, 200, 1000), Duration::from_secs(30));
    }

    #[test]
    fn plenty_remaining_sleeps_one_second() {
        let h = headers(&[
            ("x-ratelimit-remaining", String::from("50")),
            ("x-ratelimit-reset", String::from("1030")),
        ]);
        assert_eq!(wait_duration(&h, 200, 1000), Duration::from_secs(1));
    }

    #[test]
    fn dryad_style_headers_and_429() {
        let h = headers(&[
            ("ratelimit-remaining", String::from("10")),
            ("ratelimit-reset", String::from("1045")),
        ]);
        assert_eq!(wait_duration(&h, 429, 1000), Duration::from_secs(45));
    }

    #[test]
    fn reset_in_the_past_still_waits_a_moment() {
        let h = headers(&[
            ("ratelimit-remaining", String::from("0")),
            ("ratelimit-reset", String::from("900")),
        ]);
        assert_eq!(wait_duration(&h, 200, 1000), Duration::from_secs(1));
    }
}

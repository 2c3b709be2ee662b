use crate::provider::{
    arctic::ArcticDataCenter, bgr::Bgr, dataverse::Dataverse, deims::DeimsSdr, dryad::Dryad,
    figshare::Figshare, fourtu::FourTu, gfz::Gfz, halodb::HaloDb, invenio_rdm::InvenioRdm,
    mendeley::MendeleyData, nfdi4earth::Nfdi4Earth, opara::Opara, osf::Osf, pangaea::Pangaea,
    pensoft::Pensoft, radar::Radar, senckenberg::Senckenberg, stac::Stac, wikidata::Wikidata,
    zenodo::Zenodo, Provider,
};
use geoextent_core::error::{ExtentError, Result};

pub type ProviderFactory = fn() -> Result<Box<dyn Provider>>;

macro_rules! factory {
    ($name:ident) => {
        || Ok(Box::new($name::new()?) as Box<dyn Provider>)
    };
}

/// the provider registry in its fixed registration order. the order is part
/// of the public contract: it disambiguates identifiers accepted by more
/// than one adapter (bare UUIDs match BGR before Opara; bare numeric IDs
/// belong to Zenodo).
pub fn registry() -> [(&'static str, ProviderFactory); 21] {
    [
        ("Dryad", factory!(Dryad)),
        ("Figshare", factory!(Figshare)),
        ("4TU.ResearchData", factory!(FourTu)),
        ("Zenodo", factory!(Zenodo)),
        ("InvenioRDM", factory!(InvenioRdm)),
        ("PANGAEA", factory!(Pangaea)),
        ("OSF", factory!(Osf)),
        ("Dataverse", factory!(Dataverse)),
        ("GFZ", factory!(Gfz)),
        ("Pensoft", factory!(Pensoft)),
        ("BGR", factory!(Bgr)),
        ("Opara", factory!(Opara)),
        ("Senckenberg", factory!(Senckenberg)),
        ("Mendeley Data", factory!(MendeleyData)),
        ("Wikidata", factory!(Wikidata)),
        ("RADAR", factory!(Radar)),
        ("Arctic Data Center", factory!(ArcticDataCenter)),
        ("DEIMS-SDR", factory!(DeimsSdr)),
        ("NFDI4Earth", factory!(Nfdi4Earth)),
        ("HALO-DB", factory!(HaloDb)),
        ("STAC", factory!(Stac)),
    ]
}

/// two-phase provider selection.
///
/// phase one is offline: providers whose DOI prefix appears in the
/// reference are validated first. a prefix is owned by exactly one
/// provider, so a validation failure there ends the phase instead of
/// trying others.
///
/// phase two walks the full registry in registration order; validation may
/// resolve DOIs over the network, and validation errors just move on to
/// the next provider. the selection is deterministic for a fixed reference
/// and registry order.
pub async fn find_provider(reference: &str) -> Result<Box<dyn Provider>> {
    // phase one: offline DOI prefix matching
    'phase_one: for (name, factory) in registry() {
        let mut provider = factory()?;
        let prefixes = provider.doi_prefixes();
        if prefixes.is_empty() || !prefixes.iter().any(|p| reference.contains(p)) {
            continue;
        }
        match provider.validate(reference).await {
            Ok(true) => {
                log::debug!("provider {} matched {} via DOI prefix", name, reference);
                return Ok(provider);
            }
            Ok(false) => {}
            Err(e) => {
                log::debug!(
                    "provider {} DOI prefix matched but validation raised ({}), \
                     no other provider shares this prefix",
                    name,
                    e
                );
                break 'phase_one;
            }
        }
    }

    // phase two: full validation, network allowed
    for (name, factory) in registry() {
        let mut provider = factory()?;
        match provider.validate(reference).await {
            Ok(true) => {
                log::debug!("provider {} matched {} (full validation)", name, reference);
                return Ok(provider);
            }
            Ok(false) => {
                log::debug!("provider {} did not match {}", name, reference);
            }
            Err(e) => {
                log::debug!("provider {} raised during validation ({}), skipping", name, e);
            }
        }
    }

    Err(ExtentError::UnsupportedIdentifier(String::from(reference)))
}

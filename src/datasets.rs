//! Registry of the reference datasets this tool knows how to fetch.
//!
//! The set mirrors the datasets published for Nextclade: SARS-CoV-2, the
//! monkeypox family and the four seasonal influenza HA segments. Identifiers
//! are passed through verbatim to `nextclade dataset get --name`.
use crate::dataset::{Dataset, DatasetId};

pub const DATASETS: &[Dataset] = &[
    Dataset {
        id: DatasetId("sars-cov-2"),
        pathogen: "SARS-CoV-2",
        description: "SARS-CoV-2 whole genome, Wuhan-Hu-1 reference. Nextstrain clades and Pango lineages.",
    },
    Dataset {
        id: DatasetId("MPXV"),
        pathogen: "Monkeypox virus",
        description: "Monkeypox virus, all clades (I/IIa/IIb).",
    },
    Dataset {
        id: DatasetId("hMPXV"),
        pathogen: "Human monkeypox",
        description: "Human monkeypox, clade IIb lineages.",
    },
    Dataset {
        id: DatasetId("hMPXV_B1"),
        pathogen: "Human monkeypox",
        description: "Human monkeypox restricted to the B.1 outbreak lineage subtree.",
    },

    // Seasonal influenza haemagglutinin segments
    Dataset {
        id: DatasetId("flu_h1n1pdm_ha"),
        pathogen: "Influenza A H1N1pdm",
        description: "Influenza A(H1N1pdm09) HA segment.",
    },
    Dataset {
        id: DatasetId("flu_h3n2_ha"),
        pathogen: "Influenza A H3N2",
        description: "Influenza A(H3N2) HA segment.",
    },
    Dataset {
        id: DatasetId("flu_vic_ha"),
        pathogen: "Influenza B Victoria",
        description: "Influenza B Victoria-lineage HA segment.",
    },
    Dataset {
        id: DatasetId("flu_yam_ha"),
        pathogen: "Influenza B Yamagata",
        description: "Influenza B Yamagata-lineage HA segment.",
    },
];

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn dataset_ids_are_unique() {
        let mut seen = HashSet::new();
        for d in DATASETS {
            assert!(seen.insert(d.id.0), "duplicate dataset id: {}", d.id);
        }
    }

    #[test]
    fn every_dataset_has_pathogen_and_description() {
        for d in DATASETS {
            assert!(!d.pathogen.is_empty(), "{} lacks a pathogen label", d.id);
            assert!(!d.description.is_empty(), "{} lacks a description", d.id);
        }
    }
}

//! Fixed asset catalogs known at startup: hardware SKUs and rental GPU types.

use once_cell::sync::Lazy;

/// One hardware asset known to the oracle.
#[derive(Debug, Clone, Copy)]
pub struct HardwareAsset {
    pub id: &'static str,
    /// Terms adapters use to locate this asset on an upstream marketplace.
    pub search_terms: &'static [&'static str],
    /// Family keyword a scraper's relevance predicate requires alongside
    /// the model identifier (spec.md §4.2).
    pub family_keyword: &'static str,
}

/// One rental GPU type known to the oracle.
#[derive(Debug, Clone, Copy)]
pub struct RentalGpuType {
    pub id: &'static str,
    /// Canonical display/query string used against the rental marketplace.
    pub display_query: &'static str,
    pub nominal_vram_gb: u32,
}

pub static HARDWARE_CATALOG: Lazy<Vec<HardwareAsset>> = Lazy::new(|| {
    vec![
        HardwareAsset {
            id: "GPU_RTX4090",
            search_terms: &["RTX 4090", "GeForce RTX 4090"],
            family_keyword: "4090",
        },
        HardwareAsset {
            id: "GPU_RTX4080",
            search_terms: &["RTX 4080", "GeForce RTX 4080"],
            family_keyword: "4080",
        },
        HardwareAsset {
            id: "GPU_RTX4070TI",
            search_terms: &["RTX 4070 Ti", "GeForce RTX 4070 Ti"],
            family_keyword: "4070",
        },
        HardwareAsset {
            id: "GPU_RX7900XTX",
            search_terms: &["RX 7900 XTX", "Radeon RX 7900 XTX"],
            family_keyword: "7900",
        },
        HardwareAsset {
            id: "RAM_DDR5_32",
            search_terms: &["DDR5 32GB", "32GB DDR5 kit"],
            family_keyword: "DDR5",
        },
        HardwareAsset {
            id: "RAM_DDR5_64",
            search_terms: &["DDR5 64GB", "64GB DDR5 kit"],
            family_keyword: "DDR5",
        },
    ]
});

pub static RENTAL_CATALOG: Lazy<Vec<RentalGpuType>> = Lazy::new(|| {
    vec![
        RentalGpuType { id: "H100", display_query: "NVIDIA H100", nominal_vram_gb: 80 },
        RentalGpuType { id: "A100_80G", display_query: "NVIDIA A100 80GB", nominal_vram_gb: 80 },
        RentalGpuType { id: "A100_40G", display_query: "NVIDIA A100 40GB", nominal_vram_gb: 40 },
        RentalGpuType { id: "RTX4090", display_query: "NVIDIA RTX 4090", nominal_vram_gb: 24 },
        RentalGpuType { id: "A6000", display_query: "NVIDIA RTX A6000", nominal_vram_gb: 48 },
    ]
});

pub fn is_known_hardware_asset(asset_id: &str) -> bool {
    HARDWARE_CATALOG.iter().any(|a| a.id == asset_id)
}

pub fn find_hardware_asset(asset_id: &str) -> Option<&'static HardwareAsset> {
    HARDWARE_CATALOG.iter().find(|a| a.id == asset_id)
}

pub fn is_known_rental_type(gpu_type: &str) -> bool {
    RENTAL_CATALOG.iter().any(|g| g.id == gpu_type)
}

pub fn find_rental_type(gpu_type: &str) -> Option<&'static RentalGpuType> {
    RENTAL_CATALOG.iter().find(|g| g.id == gpu_type)
}

pub fn hardware_asset_ids() -> Vec<&'static str> {
    HARDWARE_CATALOG.iter().map(|a| a.id).collect()
}

pub fn rental_type_ids() -> Vec<&'static str> {
    RENTAL_CATALOG.iter().map(|g| g.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids = hardware_asset_ids();
        let n = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), n);
    }

    #[test]
    fn known_lookup_round_trips() {
        assert!(is_known_hardware_asset("GPU_RTX4090"));
        assert!(find_hardware_asset("GPU_RTX4090").is_some());
        assert!(!is_known_hardware_asset("GPU_RTX9999"));
        assert!(is_known_rental_type("H100"));
        assert!(!is_known_rental_type("NOT_A_GPU"));
    }
}

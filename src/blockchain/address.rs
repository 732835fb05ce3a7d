use crate::store::models::Network;

/// Address pool an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Transparent,
    Sprout,
    Sapling,
}

/// Classify an address by prefix and length for the given network.
/// This is a format check only; it does not verify checksums.
pub fn classify_address(address: &str, network: Network) -> Option<AddressKind> {
    if address.is_empty() {
        return None;
    }

    match network {
        Network::Main => {
            if (address.starts_with("t1") || address.starts_with("t3"))
                && (34..=36).contains(&address.len())
            {
                Some(AddressKind::Transparent)
            } else if address.starts_with("zs") && address.len() >= 78 {
                Some(AddressKind::Sapling)
            } else if address.starts_with("zc") && address.len() >= 95 {
                Some(AddressKind::Sprout)
            } else {
                None
            }
        }
        Network::Test => {
            if (address.starts_with("tm") || address.starts_with("t2"))
                && (34..=36).contains(&address.len())
            {
                Some(AddressKind::Transparent)
            } else if address.starts_with("ztestsapling") && address.len() >= 88 {
                Some(AddressKind::Sapling)
            } else if address.starts_with("zt") && address.len() >= 95 {
                Some(AddressKind::Sprout)
            } else {
                None
            }
        }
    }
}

pub fn is_sprout_address(address: &str, network: Network) -> bool {
    classify_address(address, network) == Some(AddressKind::Sprout)
}

pub fn is_sapling_address(address: &str, network: Network) -> bool {
    classify_address(address, network) == Some(AddressKind::Sapling)
}

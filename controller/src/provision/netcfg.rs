//! IPv4 parameter parsing for provisioning forms

use std::net::Ipv4Addr;

use crate::errors::FleetError;

/// Prefix length from a dotted mask (`255.255.255.0`) or a bare length (`24`).
///
/// Dotted masks must be contiguous.
pub fn parse_mask_to_cidr(mask: &str) -> Result<u8, FleetError> {
    let mask = mask.trim();
    if mask.is_empty() {
        return Err(FleetError::Validation("empty subnet mask".to_string()));
    }
    if let Ok(len) = mask.parse::<u32>() {
        if len > 32 {
            return Err(FleetError::Validation("CIDR out of range".to_string()));
        }
        return Ok(len as u8);
    }
    let addr: Ipv4Addr = mask
        .parse()
        .map_err(|_| FleetError::Validation("not a valid IPv4 dotted mask".to_string()))?;
    let bits = u32::from(addr);
    let ones = bits.leading_ones();
    // everything after the leading ones must be zero
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return Err(FleetError::Validation("non-contiguous netmask".to_string()));
    }
    Ok(ones as u8)
}

pub fn parse_ipv4(value: &str) -> Option<Ipv4Addr> {
    value.trim().parse().ok()
}

/// First valid IPv4 in a list separated by commas, spaces or semicolons.
pub fn first_ipv4(list: &str) -> Option<Ipv4Addr> {
    list.split([',', ' ', ';'])
        .filter(|part| !part.is_empty())
        .find_map(parse_ipv4)
}

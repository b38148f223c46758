/// Pick the next port for a new tenant.
///
/// Returns one above the largest of the ports in use, the highest port ever
/// handed out, and the configured baseline. Ports are never reused, so a
/// deleted tenant's port stays retired.
pub fn next_port<I>(in_use: I, high_water: u16, baseline: u16) -> Option<u16>
where
    I: IntoIterator<Item = u16>,
{
    let max = in_use
        .into_iter()
        .fold(high_water.max(baseline), |acc, port| acc.max(port));
    max.checked_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fleet_starts_above_baseline() {
        assert_eq!(next_port([], 0, 8080), Some(8081));
    }

    #[test]
    fn test_follows_highest_port() {
        assert_eq!(next_port([8081, 8083, 8082], 0, 8080), Some(8084));
    }

    #[test]
    fn test_retired_ports_are_skipped() {
        // 8084 belonged to a deleted tenant
        assert_eq!(next_port([8081, 8082], 8084, 8080), Some(8085));
    }

    #[test]
    fn test_ports_below_baseline_are_ignored() {
        assert_eq!(next_port([3000, 3001], 0, 8080), Some(8081));
    }

    #[test]
    fn test_exhausted_port_space() {
        assert_eq!(next_port([u16::MAX], 0, 8080), None);
    }
}

//! Candidate selection over collected probe responses.

use roamsim_common::ProbeResponse;
use std::cmp::Ordering;

/// Pick the response with the strongest signal. Ties go to the lowest AP id;
/// responses with a non-finite signal are never chosen.
pub fn select_best(responses: &[ProbeResponse]) -> Option<&ProbeResponse> {
    responses
        .iter()
        .filter(|r| r.signal_dbm.is_finite())
        .min_by(|a, b| rank(a, b))
}

/// Total order used by [`select_best`]: stronger first, then lower AP id.
fn rank(a: &ProbeResponse, b: &ProbeResponse) -> Ordering {
    b.signal_dbm
        .total_cmp(&a.signal_dbm)
        .then_with(|| a.ap.cmp(&b.ap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roamsim_common::{ApId, Channel};

    fn resp(ap: u32, signal_dbm: f64) -> ProbeResponse {
        ProbeResponse {
            ap: ApId(ap),
            channel: Channel(1 + 5 * (ap as u8 % 3)),
            ssid: "wifi-default".to_string(),
            signal_dbm,
        }
    }

    #[test]
    fn test_strongest_wins() {
        let rs = vec![resp(2, -92.5), resp(1, -77.0), resp(0, -98.6)];
        assert_eq!(select_best(&rs).map(|r| r.ap), Some(ApId(1)));
    }

    #[test]
    fn test_ties_go_to_lowest_ap_id() {
        let rs = vec![resp(2, -70.0), resp(1, -70.0), resp(3, -70.0)];
        assert_eq!(select_best(&rs).map(|r| r.ap), Some(ApId(1)));
    }

    #[test]
    fn test_empty_and_nan() {
        assert!(select_best(&[]).is_none());
        let rs = vec![resp(0, f64::NAN), resp(1, -90.0)];
        assert_eq!(select_best(&rs).map(|r| r.ap), Some(ApId(1)));
        assert!(select_best(&[resp(0, f64::NAN)]).is_none());
    }

    #[test]
    fn test_selection_is_order_independent() {
        let mut rs = vec![resp(0, -80.0), resp(1, -60.0), resp(2, -60.0), resp(3, -95.0)];
        let first = select_best(&rs).map(|r| r.ap);
        rs.reverse();
        assert_eq!(select_best(&rs).map(|r| r.ap), first);
        rs.rotate_left(1);
        assert_eq!(select_best(&rs).map(|r| r.ap), first);
    }
}

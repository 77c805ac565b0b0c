//! Campaign status transition table

use whatsjet_common::types::CampaignStatus;
use whatsjet_common::{Error, Result};

/// Statuses reachable from `from` in one step
pub fn allowed_targets(from: CampaignStatus) -> &'static [CampaignStatus] {
    use CampaignStatus::*;
    match from {
        Draft => &[Scheduled, Running],
        Scheduled => &[Running, Draft],
        Running => &[Paused, Completed, Failed],
        Paused => &[Running, Completed, Failed],
        Completed => &[],
        Failed => &[Running],
    }
}

pub fn is_allowed(from: CampaignStatus, to: CampaignStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Fail with `InvalidTransition` unless `from -> to` is in the table
pub fn check_transition(from: CampaignStatus, to: CampaignStatus) -> Result<()> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            current: from,
            requested: to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use CampaignStatus::*;

    const TABLE: &[(CampaignStatus, CampaignStatus)] = &[
        (Draft, Scheduled),
        (Draft, Running),
        (Scheduled, Running),
        (Scheduled, Draft),
        (Running, Paused),
        (Running, Completed),
        (Running, Failed),
        (Paused, Running),
        (Paused, Completed),
        (Paused, Failed),
        (Failed, Running),
    ];

    #[test]
    fn test_every_pair_outside_table_is_rejected() {
        let mut allowed = 0;
        for from in CampaignStatus::ALL {
            for to in CampaignStatus::ALL {
                let expected = TABLE.contains(&(from, to));
                match check_transition(from, to) {
                    Ok(()) => {
                        assert!(expected, "{} -> {} should be rejected", from, to);
                        allowed += 1;
                    }
                    Err(Error::InvalidTransition { current, requested }) => {
                        assert!(!expected, "{} -> {} should be allowed", from, to);
                        assert_eq!((current, requested), (from, to));
                    }
                    Err(other) => panic!("unexpected error {:?}", other),
                }
            }
        }
        assert_eq!(allowed, TABLE.len());
    }

    #[test]
    fn test_completed_is_terminal() {
        assert!(allowed_targets(Completed).is_empty());
        assert!(!is_allowed(Running, Running));
    }
}

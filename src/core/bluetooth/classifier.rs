//! Characteristic classification and RX/TX role selection.
//!
//! A service snapshot is split into RX candidates (notify or indicate) and
//! TX candidates (write or write-without-response), keeping discovery order.
//! The well-known NUS characteristics win when present inside the NUS
//! service; otherwise the first candidate of each kind is used. A role with
//! no candidates stays unselected.

use crate::core::bluetooth::constants::{UUID_NUS_NOTIFY_CHAR, UUID_NUS_SERVICE, UUID_NUS_WRITE_CHAR};
use crate::core::bluetooth::error::ServiceError;
use crate::core::bluetooth::types::CharacteristicDescriptor;

/// The active RX/TX pairing.
///
/// Only constructed through [`Classification::select`] or the checked
/// `with_*` setters, so `rx` is always notify/indicate capable and `tx`
/// always write capable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleMapping {
    rx: Option<CharacteristicDescriptor>,
    tx: Option<CharacteristicDescriptor>,
}

impl RoleMapping {
    pub fn rx(&self) -> Option<&CharacteristicDescriptor> {
        self.rx.as_ref()
    }

    pub fn tx(&self) -> Option<&CharacteristicDescriptor> {
        self.tx.as_ref()
    }

    pub fn with_rx(self, descriptor: CharacteristicDescriptor) -> Result<Self, ServiceError> {
        if !descriptor.capabilities.is_rx_capable() {
            return Err(ServiceError::IncompatibleRole {
                characteristic: descriptor.characteristic_id,
                role: "RX",
            });
        }
        Ok(Self {
            rx: Some(descriptor),
            ..self
        })
    }

    pub fn with_tx(self, descriptor: CharacteristicDescriptor) -> Result<Self, ServiceError> {
        if !descriptor.capabilities.is_tx_capable() {
            return Err(ServiceError::IncompatibleRole {
                characteristic: descriptor.characteristic_id,
                role: "TX",
            });
        }
        Ok(Self {
            tx: Some(descriptor),
            ..self
        })
    }
}

/// Candidates for each role, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub rx_candidates: Vec<CharacteristicDescriptor>,
    pub tx_candidates: Vec<CharacteristicDescriptor>,
}

impl Classification {
    /// Partitions a snapshot. A characteristic that can both notify and
    /// write lands in both lists.
    pub fn classify(snapshot: &[CharacteristicDescriptor]) -> Self {
        let rx_candidates = snapshot
            .iter()
            .filter(|c| c.capabilities.is_rx_capable())
            .copied()
            .collect();
        let tx_candidates = snapshot
            .iter()
            .filter(|c| c.capabilities.is_tx_capable())
            .copied()
            .collect();
        Self {
            rx_candidates,
            tx_candidates,
        }
    }

    /// Applies the selection policy to both roles
    pub fn select(&self) -> RoleMapping {
        RoleMapping {
            rx: pick(&self.rx_candidates, UUID_NUS_NOTIFY_CHAR),
            tx: pick(&self.tx_candidates, UUID_NUS_WRITE_CHAR),
        }
    }
}

fn pick(candidates: &[CharacteristicDescriptor], well_known: uuid::Uuid) -> Option<CharacteristicDescriptor> {
    candidates
        .iter()
        .find(|c| c.service_id == UUID_NUS_SERVICE && c.characteristic_id == well_known)
        .or_else(|| candidates.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::types::Capabilities;
    use uuid::Uuid;

    const NOTIFY: Capabilities = Capabilities {
        notify: true,
        indicate: false,
        write: false,
        write_without_response: false,
    };
    const INDICATE: Capabilities = Capabilities {
        notify: false,
        indicate: true,
        write: false,
        write_without_response: false,
    };
    const WRITE: Capabilities = Capabilities {
        notify: false,
        indicate: false,
        write: true,
        write_without_response: true,
    };
    const READ_ONLY: Capabilities = Capabilities {
        notify: false,
        indicate: false,
        write: false,
        write_without_response: false,
    };

    fn other(n: u128) -> Uuid {
        Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb | (n << 96))
    }

    fn nus_pair() -> Vec<CharacteristicDescriptor> {
        vec![
            CharacteristicDescriptor::new(UUID_NUS_SERVICE, UUID_NUS_WRITE_CHAR, WRITE),
            CharacteristicDescriptor::new(UUID_NUS_SERVICE, UUID_NUS_NOTIFY_CHAR, NOTIFY),
        ]
    }

    #[test]
    fn test_well_known_pair_wins_regardless_of_order() {
        let mut snapshot = vec![
            CharacteristicDescriptor::new(other(0x180f), other(0x2a19), NOTIFY),
            CharacteristicDescriptor::new(other(0x1800), other(0x2a00), WRITE),
        ];
        snapshot.extend(nus_pair());
        snapshot.push(CharacteristicDescriptor::new(other(0x1234), other(0x5678), INDICATE));

        for rotation in 0..snapshot.len() {
            let mut rotated = snapshot.clone();
            rotated.rotate_left(rotation);
            let roles = Classification::classify(&rotated).select();
            assert_eq!(roles.rx().unwrap().characteristic_id, UUID_NUS_NOTIFY_CHAR);
            assert_eq!(roles.tx().unwrap().characteristic_id, UUID_NUS_WRITE_CHAR);
        }
    }

    #[test]
    fn test_well_known_char_outside_nus_service_is_not_preferred() {
        let snapshot = vec![
            CharacteristicDescriptor::new(other(0x1800), other(0x2a00), NOTIFY),
            CharacteristicDescriptor::new(other(0x1801), UUID_NUS_NOTIFY_CHAR, NOTIFY),
        ];
        let roles = Classification::classify(&snapshot).select();
        assert_eq!(roles.rx().unwrap().characteristic_id, other(0x2a00));
    }

    #[test]
    fn test_fallback_to_first_candidate_in_order() {
        let snapshot = vec![
            CharacteristicDescriptor::new(other(0x1800), other(0x2a00), READ_ONLY),
            CharacteristicDescriptor::new(other(0x1234), other(0x0001), WRITE),
            CharacteristicDescriptor::new(other(0x1234), other(0x0002), INDICATE),
            CharacteristicDescriptor::new(other(0x1234), other(0x0003), NOTIFY),
            CharacteristicDescriptor::new(other(0x1234), other(0x0004), WRITE),
        ];
        let classification = Classification::classify(&snapshot);
        assert_eq!(classification.rx_candidates.len(), 2);
        assert_eq!(classification.tx_candidates.len(), 2);

        let roles = classification.select();
        assert_eq!(roles.rx().unwrap().characteristic_id, other(0x0002));
        assert_eq!(roles.tx().unwrap().characteristic_id, other(0x0001));
    }

    #[test]
    fn test_no_candidates_leaves_roles_unselected() {
        let snapshot = vec![
            CharacteristicDescriptor::new(other(0x1800), other(0x2a00), READ_ONLY),
            CharacteristicDescriptor::new(other(0x1234), other(0x0001), WRITE),
        ];
        let roles = Classification::classify(&snapshot).select();
        assert!(roles.rx().is_none());
        assert!(roles.tx().is_some());

        let empty = Classification::classify(&[]).select();
        assert_eq!(empty, RoleMapping::default());
    }

    #[test]
    fn test_manual_selection_enforces_role_invariant() {
        let notify = CharacteristicDescriptor::new(other(0x1234), other(0x0001), NOTIFY);
        let write = CharacteristicDescriptor::new(other(0x1234), other(0x0002), WRITE);

        let roles = RoleMapping::default().with_rx(notify).unwrap().with_tx(write).unwrap();
        assert_eq!(roles.rx(), Some(&notify));
        assert_eq!(roles.tx(), Some(&write));

        assert!(matches!(
            roles.with_rx(write),
            Err(ServiceError::IncompatibleRole { role: "RX", .. })
        ));
        assert!(matches!(
            roles.with_tx(notify),
            Err(ServiceError::IncompatibleRole { role: "TX", .. })
        ));
    }
}

//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants used for Anova Precision Cooker communication.

use uuid::Uuid;

/// Primary service advertised by the cooker.
pub const COOKER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ffe0_0000_1000_8000_00805f9b34fb);

/// Writable characteristic carrying command lines to the cooker.
pub const COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_00805f9b34fb);

/// Notifiable characteristic carrying response lines from the cooker.
///
/// The cooker multiplexes commands and responses over a single GATT
/// characteristic; the two roles are named separately because the transport
/// treats write and notify as distinct endpoints.
pub const RESPONSE_CHARACTERISTIC_UUID: Uuid = COMMAND_CHARACTERISTIC_UUID;

/// Local-name prefix advertised by the appliance family.
pub const DEVICE_NAME_PREFIX: &str = "Anova";

/// Check if a service UUID identifies the cooker.
pub fn is_cooker_service(uuid: &Uuid) -> bool {
    *uuid == COOKER_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        let service = COOKER_SERVICE_UUID.to_string();
        assert!(service.contains("ffe0"));

        let characteristic = COMMAND_CHARACTERISTIC_UUID.to_string();
        assert!(characteristic.contains("ffe1"));
    }

    #[test]
    fn test_is_cooker_service() {
        assert!(is_cooker_service(&COOKER_SERVICE_UUID));
        assert!(!is_cooker_service(&Uuid::from_u128(
            0x0000_180a_0000_1000_8000_00805f9b34fb
        )));
    }

    #[test]
    fn test_command_and_response_share_characteristic() {
        // The appliance exposes one characteristic for both directions.
        assert_eq!(COMMAND_CHARACTERISTIC_UUID, RESPONSE_CHARACTERISTIC_UUID);
    }
}

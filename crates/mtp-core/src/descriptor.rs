//! USB interface and endpoint descriptors for the MTP function.
//!
//! The function exposes one interface (class 6/1/1) with a bulk-in, a
//! bulk-out and an interrupt-in endpoint.

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, warn};

use crate::protocol::constants::*;
use crate::transport::{Direction, EndpointAllocator, TransferKind, TransportError};

/// Endpoint addresses claimed for the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSet {
    pub bulk_in: u8,
    pub bulk_out: u8,
    pub interrupt_in: u8,
}

impl EndpointSet {
    /// Claim bulk-in, bulk-out and interrupt-in, in that order.
    ///
    /// On failure every endpoint claimed so far is released again.
    pub fn request<A: EndpointAllocator>(alloc: &mut A) -> Result<Self, TransportError> {
        let mut claimed: Vec<u8> = Vec::with_capacity(3);
        let wanted = [
            (TransferKind::Bulk, Direction::In),
            (TransferKind::Bulk, Direction::Out),
            (TransferKind::Interrupt, Direction::In),
        ];
        for (kind, direction) in wanted {
            match alloc.request_endpoint(kind, direction) {
                Some(address) => claimed.push(address),
                None => {
                    warn!(kind = %kind, direction = %direction, "Endpoint allocation failed");
                    for address in claimed {
                        alloc.release_endpoint(address);
                    }
                    return Err(TransportError::EndpointUnavailable { kind, direction });
                }
            }
        }
        let set = Self {
            bulk_in: claimed[0],
            bulk_out: claimed[1],
            interrupt_in: claimed[2],
        };
        debug!(?set, "Endpoints claimed");
        Ok(set)
    }

    /// Give every endpoint back to the allocator.
    pub fn release<A: EndpointAllocator>(self, alloc: &mut A) {
        alloc.release_endpoint(self.bulk_in);
        alloc.release_endpoint(self.bulk_out);
        alloc.release_endpoint(self.interrupt_in);
    }
}

/// Descriptor builder for the MTP interface.
#[derive(Debug, Clone)]
pub struct MtpInterface {
    endpoints: EndpointSet,
    interface_number: u8,
}

impl MtpInterface {
    pub fn new(endpoints: EndpointSet) -> Self {
        Self {
            endpoints,
            interface_number: 0,
        }
    }

    pub fn endpoints(&self) -> EndpointSet {
        self.endpoints
    }

    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Take interface number `first`; returns the next free number.
    pub fn set_first_interface(&mut self, first: u8) -> u8 {
        self.interface_number = first;
        first.wrapping_add(1)
    }

    /// Interface descriptor followed by its three endpoint descriptors.
    ///
    /// `max_packet_size` applies to both bulk endpoints (64 for full speed,
    /// 512 for high speed).
    pub fn config_descriptor(&self, max_packet_size: u16) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(INTERFACE_DESCRIPTOR_SIZE + 3 * ENDPOINT_DESCRIPTOR_SIZE);
        out.extend_from_slice(&[
            INTERFACE_DESCRIPTOR_SIZE as u8,
            USB_DT_INTERFACE,
            self.interface_number,
            0, // alternate setting
            3, // endpoints
            USB_CLASS_STILL_IMAGE,
            USB_MTP_SUBCLASS,
            USB_MTP_PROTO,
            0, // no string
        ]);
        push_endpoint(
            &mut out,
            self.endpoints.interrupt_in,
            USB_ENDPOINT_XFER_INT,
            INT_ENDPOINT_MAX_PACKET,
            INT_ENDPOINT_INTERVAL,
        );
        push_endpoint(
            &mut out,
            self.endpoints.bulk_in,
            USB_ENDPOINT_XFER_BULK,
            max_packet_size,
            0,
        );
        push_endpoint(
            &mut out,
            self.endpoints.bulk_out,
            USB_ENDPOINT_XFER_BULK,
            max_packet_size,
            0,
        );
        out
    }
}

fn push_endpoint(out: &mut Vec<u8>, address: u8, attributes: u8, max_packet: u16, interval: u8) {
    out.push(ENDPOINT_DESCRIPTOR_SIZE as u8);
    out.push(USB_DT_ENDPOINT);
    out.push(address);
    out.push(attributes);
    // Writing into a Vec cannot fail.
    let _ = out.write_u16::<LittleEndian>(max_packet);
    out.push(interval);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockAllocator;

    #[test]
    fn test_request_order_and_addresses() {
        let mut alloc = MockAllocator::with_endpoints(&[1, 2, 3]);
        let set = EndpointSet::request(&mut alloc).unwrap();
        assert_eq!(
            set,
            EndpointSet {
                bulk_in: 0x81,
                bulk_out: 0x02,
                interrupt_in: 0x83,
            }
        );
    }

    #[test]
    fn test_request_failure_releases_claimed() {
        let mut alloc = MockAllocator::with_endpoints(&[1, 2]);
        let err = EndpointSet::request(&mut alloc).unwrap_err();
        assert!(matches!(
            err,
            TransportError::EndpointUnavailable {
                kind: TransferKind::Interrupt,
                direction: Direction::In
            }
        ));
        assert_eq!(alloc.released, vec![0x81, 0x02]);
    }

    #[test]
    fn test_config_descriptor_layout() {
        let mut iface = MtpInterface::new(EndpointSet {
            bulk_in: 0x81,
            bulk_out: 0x02,
            interrupt_in: 0x83,
        });
        assert_eq!(iface.set_first_interface(2), 3);
        assert_eq!(iface.interface_number(), 2);

        let desc = iface.config_descriptor(512);
        assert_eq!(desc.len(), 30);
        assert_eq!(&desc[..9], &[9, 0x04, 2, 0, 3, 0x06, 0x01, 0x01, 0]);
        assert_eq!(&desc[9..16], &[7, 0x05, 0x83, 0x03, 8, 0, 8]);
        assert_eq!(&desc[16..23], &[7, 0x05, 0x81, 0x02, 0x00, 0x02, 0]);
        assert_eq!(&desc[23..30], &[7, 0x05, 0x02, 0x02, 0x00, 0x02, 0]);
    }

    #[test]
    fn test_full_speed_packet_size() {
        let iface = MtpInterface::new(EndpointSet {
            bulk_in: 0x81,
            bulk_out: 0x01,
            interrupt_in: 0x82,
        });
        let desc = iface.config_descriptor(64);
        assert_eq!(&desc[20..22], &[64, 0]);
        assert_eq!(&desc[27..29], &[64, 0]);
    }
}

//! Decoding tests over realistic descriptor blobs
//!
//! Covers the BOS walk, WebUSB capability lookup and URL decoding the way a
//! host sees them coming off the wire.

use proptest::prelude::*;
use protocol::bos::{DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE};
use protocol::descriptor::DT_BOS;
use protocol::webusb::{SCHEME_HTTP, SCHEME_HTTPS, WEBUSB_UUID};
use protocol::{BosDescriptor, decode_bos, decode_url, decode_uuid, find_web_capability};

const WEBUSB_UUID_BYTES: [u8; 16] = [
    0x38, 0xb6, 0x08, 0x34, 0xa9, 0x09, 0xa0, 0x47, 0x8b, 0xfd, 0xa0, 0x76, 0x88, 0x15, 0xb6, 0x65,
];

fn build_bos(capabilities: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut bytes = vec![5, DT_BOS, 0, 0, capabilities.len() as u8];
    for (capability_type, data) in capabilities {
        bytes.push((data.len() + 3) as u8);
        bytes.push(DT_DEVICE_CAPABILITY);
        bytes.push(*capability_type);
        bytes.extend_from_slice(data);
    }
    let total = bytes.len() as u16;
    bytes[2..4].copy_from_slice(&total.to_le_bytes());
    bytes
}

fn webusb_payload(vendor_code: u8, landing_page: u8) -> Vec<u8> {
    let mut data = vec![0x00];
    data.extend_from_slice(&WEBUSB_UUID_BYTES);
    data.extend_from_slice(&0x0100u16.to_le_bytes());
    data.push(vendor_code);
    data.push(landing_page);
    data
}

mod bos_walk {
    use super::*;

    #[test]
    fn test_webusb_device_bos() {
        // USB 2.0 extension followed by the WebUSB platform capability
        let bytes = build_bos(&[
            (0x02, vec![0x06, 0x00, 0x00, 0x00]),
            (PLATFORM_CAPABILITY_TYPE, webusb_payload(0x01, 0x01)),
        ]);
        let bos = decode_bos(&bytes).expect("valid BOS");
        assert_eq!(bos.total_length as usize, bytes.len());
        assert_eq!(bos.capabilities.len(), 2);

        let web = find_web_capability(&bos.capabilities).expect("WebUSB capability");
        assert_eq!(web.vendor_code, Some(0x01));
        assert_eq!(web.landing_page, Some(0x01));

        let request = web.url_request().expect("landing page request");
        assert_eq!(request.request_type, 0xc0);
        assert_eq!(request.request, 0x01);
        assert_eq!(request.value, 0x01);
        assert_eq!(request.index, 0x02);
    }

    #[test]
    fn test_landing_page_zero_has_no_request() {
        let bytes = build_bos(&[(PLATFORM_CAPABILITY_TYPE, webusb_payload(0x01, 0x00))]);
        let bos = decode_bos(&bytes).expect("valid BOS");
        let web = find_web_capability(&bos.capabilities).expect("WebUSB capability");
        assert!(web.url_request().is_none());
    }

    #[test]
    fn test_header_total_length() {
        let bytes = build_bos(&[(0x02, vec![0; 4])]);
        assert_eq!(
            BosDescriptor::total_length_of(&bytes[..5]).unwrap() as usize,
            bytes.len()
        );
    }

    proptest! {
        #[test]
        fn prop_bos_walk_preserves_capabilities(
            caps in prop::collection::vec((any::<u8>(), prop::collection::vec(any::<u8>(), 0..24)), 0..6)
        ) {
            let bytes = build_bos(&caps);
            let bos = decode_bos(&bytes).expect("well-formed BOS");

            prop_assert_eq!(bos.total_length as usize, bytes.len());
            prop_assert_eq!(bos.capabilities.len(), caps.len());
            for (decoded, (capability_type, data)) in bos.capabilities.iter().zip(&caps) {
                prop_assert_eq!(decoded.capability_type, *capability_type);
                prop_assert_eq!(&decoded.data, data);
                prop_assert_eq!(decoded.length as usize, data.len() + 3);
            }
            prop_assert_eq!(bos.to_bytes(), bytes);
        }

        #[test]
        fn prop_truncated_bos_is_rejected(
            caps in prop::collection::vec((any::<u8>(), prop::collection::vec(any::<u8>(), 1..16)), 1..4),
            cut in 1usize..8,
        ) {
            let bytes = build_bos(&caps);
            let cut = cut.min(bytes.len() - 1);
            prop_assert!(decode_bos(&bytes[..bytes.len() - cut]).is_none());
        }
    }
}

mod url_decoding {
    use super::*;

    fn url_descriptor(scheme: u8, body: &str) -> Vec<u8> {
        let mut bytes = vec![(body.len() + 3) as u8, 0x03, scheme];
        bytes.extend_from_slice(body.as_bytes());
        bytes
    }

    #[test]
    fn test_length_byte_is_ignored() {
        let mut bytes = url_descriptor(SCHEME_HTTPS, "ex.org");
        bytes[0] = 5;
        assert_eq!(decode_url(&bytes).as_deref(), Some("https://ex.org"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes = vec![6, 0x03, SCHEME_HTTP, b'a', 0xff, b'b'];
        assert_eq!(decode_url(&bytes).as_deref(), Some("http://a\u{fffd}b"));
    }

    proptest! {
        #[test]
        fn prop_scheme_prefix(scheme in any::<u8>(), body in "[a-z0-9./-]{0,40}") {
            let url = decode_url(&url_descriptor(scheme, &body)).expect("header present");
            let expected = match scheme {
                0 => format!("http://{}", body),
                1 => format!("https://{}", body),
                _ => body.clone(),
            };
            prop_assert_eq!(url, expected);
        }

        #[test]
        fn prop_short_buffer_is_none(bytes in prop::collection::vec(any::<u8>(), 0..3)) {
            prop_assert!(decode_url(&bytes).is_none());
        }
    }
}

mod uuid_decoding {
    use super::*;

    #[test]
    fn test_webusb_uuid() {
        assert_eq!(decode_uuid(&WEBUSB_UUID_BYTES), WEBUSB_UUID);
    }

    proptest! {
        #[test]
        fn prop_uuid_layout(bytes in any::<[u8; 16]>()) {
            let uuid = decode_uuid(&bytes);
            let groups: Vec<&str> = uuid.split('-').collect();
            prop_assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![8, 4, 4, 4, 12]);
            prop_assert!(uuid.chars().all(|c| c == '-' || c.is_ascii_digit() || ('a'..='f').contains(&c)));

            // First three fields little-endian, the rest in order
            let data1 = format!("{:02x}{:02x}{:02x}{:02x}", bytes[3], bytes[2], bytes[1], bytes[0]);
            prop_assert_eq!(groups[0], data1.as_str());
            let data2 = format!("{:02x}{:02x}", bytes[5], bytes[4]);
            prop_assert_eq!(groups[1], data2.as_str());
            let tail: String = bytes[10..].iter().map(|b| format!("{:02x}", b)).collect();
            prop_assert_eq!(groups[4], tail.as_str());
        }
    }
}

use proptest::prelude::*;
use rawnv::header::{compute_checksum, decode_header, encode_header, HeaderError, HEADER_SIZE};

// Property: checksum is the plain byte sum, wrapped at 2^32
proptest! {
    #[test]
    fn prop_checksum_is_byte_sum(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
        let expected = payload.iter().map(|&b| b as u64).sum::<u64>() % (1u64 << 32);
        prop_assert_eq!(compute_checksum(&payload) as u64, expected);
    }
}

// Property: all-0xFF payloads sum to 255 * len
proptest! {
    #[test]
    fn prop_checksum_of_ff_run(len in 0usize..100_000) {
        let payload = vec![0xFFu8; len];
        prop_assert_eq!(compute_checksum(&payload), (255u64 * len as u64 % (1u64 << 32)) as u32);
    }
}

// Property: encoding is a pure function of the payload
proptest! {
    #[test]
    fn prop_encode_header_is_deterministic(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
        let a = encode_header(&payload).to_bytes();
        let b = encode_header(&payload.clone()).to_bytes();
        prop_assert_eq!(a, b);

        let decoded = decode_header(&a).unwrap();
        prop_assert!(decoded.warnings.is_empty());
        prop_assert_eq!(decoded.header.compressed_size as usize, payload.len());
        prop_assert!(decoded.header.validate_payload(&payload).is_empty());
    }
}

// Property: any buffer shorter than a header is rejected
proptest! {
    #[test]
    fn prop_short_buffers_are_malformed(bytes in prop::collection::vec(any::<u8>(), 0..HEADER_SIZE)) {
        let err = decode_header(&bytes).unwrap_err();
        prop_assert_eq!(err, HeaderError::Malformed { expected: HEADER_SIZE, actual: bytes.len() });
    }
}

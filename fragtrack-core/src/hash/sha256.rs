use sha2::{Digest, Sha256};

use super::{HashProvider, IncrementalHash};

const HEX_LEN: usize = 64;

/// Default 256-bit digest provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Provider;

impl HashProvider for Sha256Provider {
    fn algorithm(&self) -> &'static str {
        "SHA-256"
    }

    fn compute(&self, data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn begin(&self) -> Box<dyn IncrementalHash> {
        Box::new(Sha256Incremental(Sha256::new()))
    }

    fn validate(&self, value: &str) -> bool {
        value.len() == HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

struct Sha256Incremental(Sha256);

impl IncrementalHash for Sha256Incremental {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finish(self: Box<Self>) -> String {
        hex::encode(self.0.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_matches_known_vector() {
        let p = Sha256Provider;
        assert_eq!(
            p.compute(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let p = Sha256Provider;
        let mut inc = p.begin();
        inc.update(b"hello ");
        inc.update(b"world");
        assert_eq!(inc.finish(), p.compute(b"hello world"));
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let p = Sha256Provider;
        assert!(p.validate(&"a".repeat(64)));
        assert!(p.validate(&"AB".repeat(32)));
        assert!(!p.validate(""));
        assert!(!p.validate(&"a".repeat(63)));
        assert!(!p.validate(&"g".repeat(64)));
    }

    #[test]
    fn normalize_folds_case() {
        let p = Sha256Provider;
        assert_eq!(p.normalize("ABCDEF"), "abcdef");
    }
}

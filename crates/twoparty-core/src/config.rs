//! Protocol parameters shared by both roles

/// Default Paillier modulus size generated by the initiator
pub const DEFAULT_PAILLIER_MODULUS_BITS: usize = 2048;

/// Smallest Paillier modulus that can carry the two-party sign arithmetic
pub const MIN_PAILLIER_MODULUS_BITS: usize = 1024;

/// Smallest Paillier modulus the responder accepts by default
pub const DEFAULT_MIN_PEER_MODULUS_BITS: usize = 2047;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Bits of the Paillier modulus generated during keygen and rotate
    pub paillier_modulus_bits: usize,
    /// Smallest peer Paillier modulus accepted
    pub min_peer_modulus_bits: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            paillier_modulus_bits: DEFAULT_PAILLIER_MODULUS_BITS,
            min_peer_modulus_bits: DEFAULT_MIN_PEER_MODULUS_BITS,
        }
    }
}

impl ProtocolConfig {
    pub fn with_paillier_modulus_bits(mut self, bits: usize) -> Self {
        self.paillier_modulus_bits = bits;
        self
    }

    pub fn with_min_peer_modulus_bits(mut self, bits: usize) -> Self {
        self.min_peer_modulus_bits = bits;
        self
    }

    /// Small moduli for fast tests; never use outside tests
    pub fn insecure_for_testing() -> Self {
        Self {
            paillier_modulus_bits: 1024,
            min_peer_modulus_bits: 1023,
        }
    }
}

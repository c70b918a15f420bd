//! Paillier encryption of secp256k1 shares and its zero-knowledge proofs

use crate::config::MIN_PAILLIER_MODULUS_BITS;
use crate::curve::{Curve, CurvePoint, Secp256k1};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use libpaillier::{unknown_order::BigNumber, DecryptionKey, EncryptionKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// secp256k1 group order, big-endian
const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// Rounds of the correct-key proof
const CORRECT_KEY_ROUNDS: usize = 11;

/// Small primes the modulus must not be divisible by
const SMALL_PRIME_BOUND: u64 = 1000;

pub fn curve_order() -> BigNumber {
    BigNumber::from_slice(CURVE_ORDER)
}

pub fn scalar_to_bn(scalar: &Scalar) -> BigNumber {
    BigNumber::from_slice(scalar.to_bytes())
}

/// Reduce an arbitrary non-negative integer into a scalar
pub fn bn_to_scalar(value: &BigNumber) -> Result<Scalar> {
    let reduced = value % &curve_order();
    let bytes = reduced.to_bytes();
    if bytes.len() > 32 {
        return Err(Error::Crypto("reduced value exceeds 32 bytes".to_string()));
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    Secp256k1::decode_scalar(&padded)
}

/// Initiator's Paillier key material; only the primes are persisted
pub struct PaillierKeyPair {
    pub p: BigNumber,
    pub q: BigNumber,
    pub decryption_key: DecryptionKey,
    pub encryption_key: EncryptionKey,
}

impl PaillierKeyPair {
    /// Generate a key with a modulus of `modulus_bits` bits
    pub fn generate(modulus_bits: usize) -> Result<Self> {
        if modulus_bits < MIN_PAILLIER_MODULUS_BITS {
            return Err(Error::InvalidInput(format!(
                "Paillier modulus must be at least {MIN_PAILLIER_MODULUS_BITS} bits, got {modulus_bits}"
            )));
        }
        loop {
            let p = BigNumber::prime(modulus_bits / 2);
            let q = BigNumber::prime(modulus_bits / 2);
            if p == q {
                continue;
            }
            let pair = Self::from_primes(p, q)?;
            if pair.encryption_key.n().bit_length() >= modulus_bits - 1 {
                return Ok(pair);
            }
        }
    }

    pub fn from_primes(p: BigNumber, q: BigNumber) -> Result<Self> {
        let decryption_key = DecryptionKey::with_primes_unchecked(&p, &q)
            .ok_or_else(|| Error::Crypto("invalid Paillier primes".to_string()))?;
        let encryption_key = EncryptionKey::from(&decryption_key);
        Ok(Self {
            p,
            q,
            decryption_key,
            encryption_key,
        })
    }

    pub fn totient(&self) -> BigNumber {
        (&self.p - &BigNumber::one()) * (&self.q - &BigNumber::one())
    }

    pub fn decrypt(&self, ciphertext: &BigNumber) -> Result<BigNumber> {
        self.decryption_key
            .decrypt(ciphertext)
            .map(BigNumber::from_slice)
            .ok_or_else(|| Error::VerificationFailed("ciphertext does not decrypt".to_string()))
    }
}

/// Encrypt `value`, returning the ciphertext and the randomness used
pub fn encrypt(key: &EncryptionKey, value: &BigNumber) -> Result<(BigNumber, BigNumber)> {
    key.encrypt(value.to_bytes(), None)
        .ok_or_else(|| Error::Crypto("plaintext out of range for Paillier key".to_string()))
}

pub fn add(key: &EncryptionKey, a: &BigNumber, b: &BigNumber) -> Result<BigNumber> {
    key.add(a, b)
        .ok_or_else(|| Error::Crypto("homomorphic addition failed".to_string()))
}

pub fn mul(key: &EncryptionKey, ciphertext: &BigNumber, factor: &BigNumber) -> Result<BigNumber> {
    key.mul(ciphertext, factor)
        .ok_or_else(|| Error::Crypto("homomorphic multiplication failed".to_string()))
}

/// Reject moduli that are too small, even, or have a small factor
pub fn check_modulus(key: &EncryptionKey, min_bits: usize) -> Result<()> {
    let n = key.n();
    let bits = n.bit_length();
    if bits < min_bits {
        return Err(Error::VerificationFailed(format!(
            "Paillier modulus has {bits} bits, need at least {min_bits}"
        )));
    }
    if n.gcd(&small_primorial()) != BigNumber::one() {
        return Err(Error::VerificationFailed(
            "Paillier modulus has a small factor".to_string(),
        ));
    }
    Ok(())
}

fn small_primorial() -> BigNumber {
    let mut product = BigNumber::one();
    for candidate in 2..SMALL_PRIME_BOUND {
        if (2..candidate).take_while(|d| d * d <= candidate).all(|d| candidate % d != 0) {
            product = product * BigNumber::from(candidate);
        }
    }
    product
}

/// Proof that `N` is a valid Paillier modulus: the prover extracts `N`-th
/// roots of hash-derived challenges, which requires `gcd(N, φ(N)) = 1`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectKeyProof {
    #[serde(with = "big_hex_vec")]
    pub sigma: Vec<BigNumber>,
}

impl CorrectKeyProof {
    pub fn prove(pair: &PaillierKeyPair) -> Result<Self> {
        let n = pair.encryption_key.n();
        let n_inv = n
            .invert(&pair.totient())
            .ok_or_else(|| Error::Crypto("N not invertible mod φ(N)".to_string()))?;
        let sigma = key_challenges(n)
            .iter()
            .map(|rho| rho.modpow(&n_inv, n))
            .collect();
        Ok(Self { sigma })
    }

    pub fn verify(&self, key: &EncryptionKey) -> Result<()> {
        let n = key.n();
        let challenges = key_challenges(n);
        if self.sigma.len() != challenges.len() {
            return Err(Error::VerificationFailed(
                "correct-key proof has wrong length".to_string(),
            ));
        }
        for (sigma, rho) in self.sigma.iter().zip(challenges.iter()) {
            if sigma.modpow(n, n) != *rho {
                return Err(Error::VerificationFailed(
                    "correct-key proof does not verify".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Deterministic challenges in `Z_N`, each wider than `N` before reduction
fn key_challenges(n: &BigNumber) -> Vec<BigNumber> {
    let n_bytes = n.to_bytes();
    let blocks = n.bit_length() / 256 + 2;
    (0..CORRECT_KEY_ROUNDS)
        .map(|round| {
            let mut wide = Vec::with_capacity(blocks * 32);
            for block in 0..blocks {
                let mut hasher = Keccak256::new();
                hasher.update(b"twoparty/paillier-key");
                hasher.update(&n_bytes);
                hasher.update((round as u32).to_be_bytes());
                hasher.update((block as u32).to_be_bytes());
                wide.extend_from_slice(&hasher.finalize());
            }
            BigNumber::from_slice(wide) % n
        })
        .collect()
}

/// Proof that a Paillier ciphertext `c` encrypts the discrete log of `Q`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectEncryptionProof {
    pub u1: CurvePoint<Secp256k1>,
    #[serde(with = "big_hex")]
    pub u2: BigNumber,
    #[serde(with = "big_hex")]
    pub s1: BigNumber,
    #[serde(with = "big_hex")]
    pub s2: BigNumber,
}

impl CorrectEncryptionProof {
    /// `c = Enc(x; r)` under `key` and `Q = x·G`
    pub fn prove(
        key: &EncryptionKey,
        ciphertext: &BigNumber,
        nonce: &BigNumber,
        x: &Scalar,
    ) -> Result<Self> {
        let n = key.n();
        let nn = key.nn();
        let order = curve_order();
        let alpha = BigNumber::random(&(&order * &order * &order));
        let beta = loop {
            let candidate = BigNumber::random(n);
            if !candidate.is_zero() {
                break candidate;
            }
        };

        let u1 = Secp256k1::mul_base(&bn_to_scalar(&alpha)?);
        let u2 = g_pow(n, nn, &alpha).modmul(&beta.modpow(n, nn), nn);
        let q = Secp256k1::mul_base(x);
        let e = encryption_challenge(n, ciphertext, &q, &u1, &u2);

        let s1 = &e * &scalar_to_bn(x) + &alpha;
        let s2 = nonce.modpow(&e, n).modmul(&beta, n);
        Ok(Self {
            u1: CurvePoint(u1),
            u2,
            s1,
            s2,
        })
    }

    pub fn verify(&self, key: &EncryptionKey, ciphertext: &BigNumber, q: &ProjectivePoint) -> Result<()> {
        let n = key.n();
        let nn = key.nn();
        let fail = |what: &str| Error::VerificationFailed(format!("correct-encryption proof: {what}"));

        if self.u2.is_zero() || self.s2.is_zero() || &self.s2 >= n {
            return Err(fail("response out of range"));
        }
        if ciphertext.is_zero() || ciphertext >= nn {
            return Err(fail("ciphertext out of range"));
        }
        let c_inv = ciphertext
            .invert(nn)
            .ok_or_else(|| fail("ciphertext not invertible"))?;

        let e = encryption_challenge(n, ciphertext, q, &self.u1.0, &self.u2);

        let expected_u1 = Secp256k1::mul_base(&bn_to_scalar(&self.s1)?) - *q * bn_to_scalar(&e)?;
        if expected_u1 != self.u1.0 {
            return Err(fail("curve relation"));
        }

        let expected_u2 = g_pow(n, nn, &self.s1)
            .modmul(&self.s2.modpow(n, nn), nn)
            .modmul(&c_inv.modpow(&e, nn), nn);
        if expected_u2 != self.u2 {
            return Err(fail("ciphertext relation"));
        }
        Ok(())
    }
}

/// `(N + 1)^k mod N²`, which equals `1 + k·N mod N²`
fn g_pow(n: &BigNumber, nn: &BigNumber, k: &BigNumber) -> BigNumber {
    (BigNumber::one() + (k % n) * n) % nn
}

fn encryption_challenge(
    n: &BigNumber,
    ciphertext: &BigNumber,
    q: &ProjectivePoint,
    u1: &ProjectivePoint,
    u2: &BigNumber,
) -> BigNumber {
    let mut hasher = Keccak256::new();
    for chunk in [
        b"twoparty/paillier-enc".to_vec(),
        Secp256k1::encode_point(&Secp256k1::generator()),
        n.to_bytes(),
        ciphertext.to_bytes(),
        Secp256k1::encode_point(q),
        Secp256k1::encode_point(u1),
        u2.to_bytes(),
    ] {
        hasher.update((chunk.len() as u32).to_be_bytes());
        hasher.update(&chunk);
    }
    BigNumber::from_slice(hasher.finalize())
}

/// Big integers as big-endian hex
pub(crate) mod big_hex {
    use libpaillier::unknown_order::BigNumber;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigNumber, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value.to_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigNumber, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        Ok(BigNumber::from_slice(bytes))
    }
}

mod big_hex_vec {
    use libpaillier::unknown_order::BigNumber;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[BigNumber], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|v| hex::encode(v.to_bytes())))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<BigNumber>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|s| {
                hex::decode(s)
                    .map(BigNumber::from_slice)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn keypair() -> &'static PaillierKeyPair {
        static PAIR: OnceLock<PaillierKeyPair> = OnceLock::new();
        PAIR.get_or_init(|| PaillierKeyPair::generate(1024).unwrap())
    }

    #[test]
    fn test_scalar_conversions() {
        let x = Secp256k1::random_scalar();
        assert_eq!(bn_to_scalar(&scalar_to_bn(&x)).unwrap(), x);
        let wrapped = scalar_to_bn(&x) + curve_order();
        assert_eq!(bn_to_scalar(&wrapped).unwrap(), x);
    }

    #[test]
    fn test_encrypt_decrypt_homomorphic() {
        let pair = keypair();
        let ek = &pair.encryption_key;
        let (c1, _) = encrypt(ek, &BigNumber::from(20u64)).unwrap();
        let (c2, _) = encrypt(ek, &BigNumber::from(22u64)).unwrap();
        let sum = add(ek, &c1, &c2).unwrap();
        assert_eq!(pair.decrypt(&sum).unwrap(), BigNumber::from(42u64));
        let scaled = mul(ek, &c1, &BigNumber::from(3u64)).unwrap();
        assert_eq!(pair.decrypt(&scaled).unwrap(), BigNumber::from(60u64));
    }

    #[test]
    fn test_tiny_modulus_refused() {
        assert!(matches!(PaillierKeyPair::generate(0), Err(Error::InvalidInput(_))));
        assert!(PaillierKeyPair::generate(MIN_PAILLIER_MODULUS_BITS - 1).is_err());
    }

    #[test]
    fn test_modulus_checks() {
        let ek = &keypair().encryption_key;
        check_modulus(ek, 1023).unwrap();
        assert!(matches!(check_modulus(ek, 2047), Err(Error::VerificationFailed(_))));
        assert_eq!(small_primorial() % BigNumber::from(997u64), BigNumber::zero());
    }

    #[test]
    fn test_correct_key_proof() {
        let pair = keypair();
        let proof = CorrectKeyProof::prove(pair).unwrap();
        proof.verify(&pair.encryption_key).unwrap();

        let mut forged = proof.clone();
        forged.sigma[0] = forged.sigma[0].clone() + BigNumber::one();
        assert!(forged.verify(&pair.encryption_key).is_err());
    }

    #[test]
    fn test_correct_encryption_proof() {
        let pair = keypair();
        let ek = &pair.encryption_key;
        let x = Secp256k1::random_scalar();
        let (c, r) = encrypt(ek, &scalar_to_bn(&x)).unwrap();
        let q = Secp256k1::mul_base(&x);

        let proof = CorrectEncryptionProof::prove(ek, &c, &r, &x).unwrap();
        proof.verify(ek, &c, &q).unwrap();

        let json = serde_json::to_string(&proof).unwrap();
        let parsed: CorrectEncryptionProof = serde_json::from_str(&json).unwrap();
        parsed.verify(ek, &c, &q).unwrap();

        let other = Secp256k1::mul_base(&Secp256k1::random_scalar());
        assert!(proof.verify(ek, &c, &other).is_err());

        let (c_other, _) = encrypt(ek, &scalar_to_bn(&x)).unwrap();
        assert!(proof.verify(ek, &c_other, &q).is_err());
    }
}

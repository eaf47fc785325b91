//! SRP-6a primitives used by the password-proof handshake
//!
//! Group: RFC 5054 2048-bit safe prime with generator 2. Hash: SHA-256.
//! All values cross the wire as big-endian byte strings.

use num_bigint::BigUint;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use thiserror::Error;

const GENERATOR: u8 = 2;
const PRIVATE_EPHEMERAL_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// The group modulus N, big-endian.
pub const MODULUS: [u8; 256] = [
    0xac, 0x6b, 0xdb, 0x41, 0x32, 0x4a, 0x9a, 0x9b, 0xf1, 0x66, 0xde, 0x5e,
    0x13, 0x89, 0x58, 0x2f, 0xaf, 0x72, 0xb6, 0x65, 0x19, 0x87, 0xee, 0x07,
    0xfc, 0x31, 0x92, 0x94, 0x3d, 0xb5, 0x60, 0x50, 0xa3, 0x73, 0x29, 0xcb,
    0xb4, 0xa0, 0x99, 0xed, 0x81, 0x93, 0xe0, 0x75, 0x77, 0x67, 0xa1, 0x3d,
    0xd5, 0x23, 0x12, 0xab, 0x4b, 0x03, 0x31, 0x0d, 0xcd, 0x7f, 0x48, 0xa9,
    0xda, 0x04, 0xfd, 0x50, 0xe8, 0x08, 0x39, 0x69, 0xed, 0xb7, 0x67, 0xb0,
    0xcf, 0x60, 0x95, 0x17, 0x9a, 0x16, 0x3a, 0xb3, 0x66, 0x1a, 0x05, 0xfb,
    0xd5, 0xfa, 0xaa, 0xe8, 0x29, 0x18, 0xa9, 0x96, 0x2f, 0x0b, 0x93, 0xb8,
    0x55, 0xf9, 0x79, 0x93, 0xec, 0x97, 0x5e, 0xea, 0xa8, 0x0d, 0x74, 0x0a,
    0xdb, 0xf4, 0xff, 0x74, 0x73, 0x59, 0xd0, 0x41, 0xd5, 0xc3, 0x3e, 0xa7,
    0x1d, 0x28, 0x1e, 0x44, 0x6b, 0x14, 0x77, 0x3b, 0xca, 0x97, 0xb4, 0x3a,
    0x23, 0xfb, 0x80, 0x16, 0x76, 0xbd, 0x20, 0x7a, 0x43, 0x6c, 0x64, 0x81,
    0xf1, 0xd2, 0xb9, 0x07, 0x87, 0x17, 0x46, 0x1a, 0x5b, 0x9d, 0x32, 0xe6,
    0x88, 0xf8, 0x77, 0x48, 0x54, 0x45, 0x23, 0xb5, 0x24, 0xb0, 0xd5, 0x7d,
    0x5e, 0xa7, 0x7a, 0x27, 0x75, 0xd2, 0xec, 0xfa, 0x03, 0x2c, 0xfb, 0xdb,
    0xf5, 0x2f, 0xb3, 0x78, 0x61, 0x60, 0x27, 0x90, 0x04, 0xe5, 0x7a, 0xe6,
    0xaf, 0x87, 0x4e, 0x73, 0x03, 0xce, 0x53, 0x29, 0x9c, 0xcc, 0x04, 0x1c,
    0x7b, 0xc3, 0x08, 0xd8, 0x2a, 0x56, 0x98, 0xf3, 0xa8, 0xd0, 0xc3, 0x82,
    0x71, 0xae, 0x35, 0xf8, 0xe9, 0xdb, 0xfb, 0xb6, 0x94, 0xb5, 0xc8, 0x03,
    0xd8, 0x9f, 0x7a, 0xe4, 0x35, 0xde, 0x23, 0x6d, 0x52, 0x5f, 0x54, 0x75,
    0x9b, 0x65, 0xe3, 0x72, 0xfc, 0xd6, 0x8e, 0xf2, 0x0f, 0xa7, 0x11, 0x1f,
    0x9e, 0x4a, 0xff, 0x73,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SrpError {
    #[error("private ephemeral is empty")]
    EmptyPrivateEphemeral,
    #[error("public ephemeral is zero modulo N")]
    UnsafePublicValue,
    #[error("scrambling parameter is zero")]
    ZeroScrambler,
}

struct Group {
    n: BigUint,
    g: BigUint,
    /// Multiplier parameter `k = H(N | PAD(g))`.
    k: BigUint,
}

fn group() -> &'static Group {
    static GROUP: OnceLock<Group> = OnceLock::new();
    GROUP.get_or_init(|| {
        let n = BigUint::from_bytes_be(&MODULUS);
        let g = BigUint::from(GENERATOR);
        let k = BigUint::from_bytes_be(&hash(&[&MODULUS[..], pad(&g).as_slice()]));
        Group { n, g, k }
    })
}

fn hash(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Left-pads `value` with zeroes to the byte length of N.
fn pad(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut padded = vec![0u8; MODULUS.len().saturating_sub(bytes.len())];
    padded.extend_from_slice(&bytes);
    padded
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// `x = H(s | H(I ":" P))`
fn private_key(identity: &[u8], password: &[u8], salt: &[u8]) -> BigUint {
    let inner = hash(&[identity, &b":"[..], password]);
    BigUint::from_bytes_be(&hash(&[salt, inner.as_slice()]))
}

fn is_zero_mod_n(value: &BigUint) -> bool {
    (value % &group().n) == BigUint::from(0u8)
}

/// Computes `A = g^a mod N` for a private ephemeral `a`.
pub fn public_ephemeral(a: &[u8]) -> Vec<u8> {
    let group = group();
    group
        .g
        .modpow(&BigUint::from_bytes_be(a), &group.n)
        .to_bytes_be()
}

/// Generates a fresh ephemeral key pair, returned as `(A, a)`.
pub fn initiate_handshake() -> Result<(Vec<u8>, Vec<u8>), SrpError> {
    let a = random_bytes(PRIVATE_EPHEMERAL_LEN);
    let a_pub = public_ephemeral(&a);

    if is_zero_mod_n(&BigUint::from_bytes_be(&a_pub)) {
        return Err(SrpError::UnsafePublicValue);
    }

    Ok((a_pub, a))
}

/// Derives the session key `K` from the server's salt and public ephemeral.
///
/// Fails if `B` is zero modulo N or if the scrambling parameter `u` is zero;
/// either would let a malicious server force a known shared secret.
pub fn complete_handshake(
    a_pub: &[u8],
    a: &[u8],
    identity: &[u8],
    password: &[u8],
    salt: &[u8],
    b_pub: &[u8],
) -> Result<Vec<u8>, SrpError> {
    if a.is_empty() {
        return Err(SrpError::EmptyPrivateEphemeral);
    }

    let group = group();
    let big_a = BigUint::from_bytes_be(a_pub);
    let big_b = BigUint::from_bytes_be(b_pub);

    if is_zero_mod_n(&big_a) || is_zero_mod_n(&big_b) {
        return Err(SrpError::UnsafePublicValue);
    }

    let u = BigUint::from_bytes_be(&hash(&[pad(&big_a).as_slice(), pad(&big_b).as_slice()]));
    if u == BigUint::from(0u8) {
        return Err(SrpError::ZeroScrambler);
    }

    let x = private_key(identity, password, salt);
    let kgx = (&group.k * group.g.modpow(&x, &group.n)) % &group.n;
    let base = ((&big_b % &group.n) + &group.n - kgx) % &group.n;
    let exponent = BigUint::from_bytes_be(a) + u * x;
    let secret = base.modpow(&exponent, &group.n);

    Ok(hash(&[secret.to_bytes_be().as_slice()]))
}

/// Computes the client proof `M = H(H(N) xor H(g) | H(I) | s | A | B | K)`.
///
/// Returns `None` when the safety check fails: either public value is zero
/// modulo N or no session key was derived.
pub fn client_proof(
    identity: &[u8],
    salt: &[u8],
    a_pub: &[u8],
    b_pub: &[u8],
    key: &[u8],
) -> Option<Vec<u8>> {
    if key.is_empty()
        || is_zero_mod_n(&BigUint::from_bytes_be(a_pub))
        || is_zero_mod_n(&BigUint::from_bytes_be(b_pub))
    {
        return None;
    }

    let hn = hash(&[&MODULUS[..]]);
    let hg = hash(&[&[GENERATOR][..]]);
    let group_digest: Vec<u8> = hn.iter().zip(hg.iter()).map(|(n, g)| n ^ g).collect();
    let hi = hash(&[identity]);

    Some(hash(&[
        group_digest.as_slice(),
        hi.as_slice(),
        salt,
        a_pub,
        b_pub,
        key,
    ]))
}

/// Computes the password verifier `v = g^x mod N` for a known salt.
pub fn verifier(identity: &[u8], password: &[u8], salt: &[u8]) -> Vec<u8> {
    let group = group();
    let x = private_key(identity, password, salt);
    group.g.modpow(&x, &group.n).to_bytes_be()
}

/// Registers a new account: a random salt and its verifier, as `(s, v)`.
pub fn new_client(identity: &[u8], password: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SrpError> {
    let salt = random_bytes(SALT_LEN);
    let verifier = verifier(identity, password, &salt);

    if is_zero_mod_n(&BigUint::from_bytes_be(&verifier)) {
        return Err(SrpError::UnsafePublicValue);
    }

    Ok((salt, verifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &[u8] = b"chatbot";
    const PASSWORD: &[u8] = b"hunter2";

    /// Server half of the exchange, used to check key agreement.
    struct ServerHalf {
        b: BigUint,
        b_pub: Vec<u8>,
        v: BigUint,
    }

    impl ServerHalf {
        fn new(verifier: &[u8], b: &[u8]) -> Self {
            let group = group();
            let v = BigUint::from_bytes_be(verifier);
            let b = BigUint::from_bytes_be(b);
            let b_pub = ((&group.k * &v) + group.g.modpow(&b, &group.n)) % &group.n;
            Self {
                b,
                b_pub: b_pub.to_bytes_be(),
                v,
            }
        }

        fn session_key(&self, a_pub: &[u8]) -> Vec<u8> {
            let group = group();
            let big_a = BigUint::from_bytes_be(a_pub);
            let big_b = BigUint::from_bytes_be(&self.b_pub);
            let u = BigUint::from_bytes_be(&hash(&[pad(&big_a).as_slice(), pad(&big_b).as_slice()]));
            let secret = (big_a * self.v.modpow(&u, &group.n)).modpow(&self.b, &group.n);
            hash(&[secret.to_bytes_be().as_slice()])
        }
    }

    #[test]
    fn test_client_and_server_agree_on_session_key() {
        let salt = vec![7u8; SALT_LEN];
        let v = verifier(IDENTITY, PASSWORD, &salt);
        let server = ServerHalf::new(&v, &[0x42; 32]);

        let (a_pub, a) = initiate_handshake().unwrap();
        let client_key =
            complete_handshake(&a_pub, &a, IDENTITY, PASSWORD, &salt, &server.b_pub).unwrap();

        assert_eq!(client_key, server.session_key(&a_pub));
        assert_eq!(client_key.len(), 32);
    }

    #[test]
    fn test_wrong_password_yields_different_key() {
        let salt = vec![9u8; SALT_LEN];
        let v = verifier(IDENTITY, PASSWORD, &salt);
        let server = ServerHalf::new(&v, &[0x17; 32]);

        let (a_pub, a) = initiate_handshake().unwrap();
        let client_key =
            complete_handshake(&a_pub, &a, IDENTITY, b"wrong", &salt, &server.b_pub).unwrap();

        assert_ne!(client_key, server.session_key(&a_pub));
    }

    #[test]
    fn test_proof_is_deterministic_for_fixed_inputs() {
        let salt = vec![1u8; SALT_LEN];
        let a = vec![3u8; PRIVATE_EPHEMERAL_LEN];
        let a_pub = public_ephemeral(&a);
        let server = ServerHalf::new(&verifier(IDENTITY, PASSWORD, &salt), &[5u8; 32]);

        let first_key =
            complete_handshake(&a_pub, &a, IDENTITY, PASSWORD, &salt, &server.b_pub).unwrap();
        let second_key =
            complete_handshake(&a_pub, &a, IDENTITY, PASSWORD, &salt, &server.b_pub).unwrap();
        assert_eq!(first_key, second_key);

        let first = client_proof(IDENTITY, &salt, &a_pub, &server.b_pub, &first_key).unwrap();
        let second = client_proof(IDENTITY, &salt, &a_pub, &server.b_pub, &second_key).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_verifier_is_deterministic_for_fixed_salt() {
        let salt = vec![4u8; SALT_LEN];
        assert_eq!(
            verifier(IDENTITY, PASSWORD, &salt),
            verifier(IDENTITY, PASSWORD, &salt)
        );
        assert_ne!(
            verifier(IDENTITY, PASSWORD, &salt),
            verifier(IDENTITY, b"other", &salt)
        );
    }

    #[test]
    fn test_new_client_produces_matching_verifier() {
        let (salt, v) = new_client(IDENTITY, PASSWORD).unwrap();
        assert_eq!(salt.len(), SALT_LEN);
        assert_eq!(v, verifier(IDENTITY, PASSWORD, &salt));
    }

    #[test]
    fn test_server_value_multiple_of_n_is_rejected() {
        let (a_pub, a) = initiate_handshake().unwrap();
        let salt = vec![2u8; SALT_LEN];

        let result = complete_handshake(&a_pub, &a, IDENTITY, PASSWORD, &salt, &MODULUS);
        assert_eq!(result, Err(SrpError::UnsafePublicValue));

        let result = complete_handshake(&a_pub, &a, IDENTITY, PASSWORD, &salt, &[0u8]);
        assert_eq!(result, Err(SrpError::UnsafePublicValue));
    }

    #[test]
    fn test_client_proof_safety_check() {
        let (a_pub, _) = initiate_handshake().unwrap();
        let salt = vec![2u8; SALT_LEN];

        assert!(client_proof(IDENTITY, &salt, &a_pub, &MODULUS, &[1u8; 32]).is_none());
        assert!(client_proof(IDENTITY, &salt, &a_pub, &[5u8], &[]).is_none());
        assert!(client_proof(IDENTITY, &salt, &a_pub, &[5u8], &[1u8; 32]).is_some());
    }

    #[test]
    fn test_empty_private_ephemeral_is_rejected() {
        let result = complete_handshake(&[5u8], &[], IDENTITY, PASSWORD, &[1u8], &[5u8]);
        assert_eq!(result, Err(SrpError::EmptyPrivateEphemeral));
    }
}

//! Fixed-input vectors for the stealth derivation
//!
//! Each vector recomputes the expected value step by step with `k256` and
//! `sha2` directly, independent of the crate's helpers, and checks the crate
//! agrees.

#[cfg(test)]
#[allow(non_snake_case)] // Crypto notation uses B, V, R, P, etc.
mod stealth_test_vectors {
    use k256::{
        elliptic_curve::{
            ops::Reduce, point::AffineCoordinates, sec1::ToEncodedPoint, PrimeField,
        },
        FieldBytes, ProjectivePoint, Scalar, U256,
    };
    use sha2::{Digest, Sha256};

    use crate::amount::{commit_amount, Blinding};
    use crate::felt::Felt;
    use crate::identity::StealthIdentity;
    use crate::keys::KeyPair;
    use crate::note::{note_commitment, nullifier_hash};
    use crate::stealth::{derive_stealth_address_with_ephemeral, detect_payment, Announcement};

    fn bytes_of(v: u8) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[31] = v;
        bytes
    }

    fn scalar_of(v: u8) -> Scalar {
        Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(bytes_of(v)))).unwrap()
    }

    fn compress(point: &ProjectivePoint) -> Vec<u8> {
        point.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    fn to_array(bytes: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        out
    }

    fn sha(parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        to_array(&hasher.finalize())
    }

    /// Vector 1: spend = 3, view = 5, ephemeral = 7
    #[test]
    fn test_vector_1_small_scalars() {
        let identity = StealthIdentity::from_private_keys(&bytes_of(3), &bytes_of(5)).unwrap();
        let ephemeral = KeyPair::from_secret_bytes(&bytes_of(7), "ephemeral").unwrap();

        let G = ProjectivePoint::GENERATOR;
        let B = G * scalar_of(3);
        let V = G * scalar_of(5);

        // S = x(7·V) = x(35·G)
        let shared = to_array(&(V * scalar_of(7)).to_affine().x());
        let shared_alt = to_array(&(G * scalar_of(35)).to_affine().x());
        assert_eq!(shared, shared_alt);

        // t = SHA256(domain || S) mod n
        let digest = sha(&[b"stealthpay_tweak_v1", &shared]);
        let t = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(digest));

        // P = B + t·G, address = mask251(SHA256(P))
        let P = B + G * t;
        let mut address_bytes = sha(&[&compress(&P)]);
        address_bytes[0] &= 0x07;
        let expected_address = Felt::from_be_bytes(address_bytes).unwrap();

        let computation =
            derive_stealth_address_with_ephemeral(&identity.meta_address(), ephemeral).unwrap();
        assert_eq!(computation.stealth_pub_key.as_bytes().to_vec(), compress(&P));
        assert_eq!(*computation.address(), expected_address);
        assert_eq!(
            computation.ephemeral_pub_key().as_bytes().to_vec(),
            compress(&(G * scalar_of(7)))
        );

        // p = 3 + t
        let announcement = Announcement {
            ephemeral_pub_key: *computation.ephemeral_pub_key(),
            stealth_address: expected_address,
            amount: "1".to_string(),
            token: "0x0".to_string(),
            tx_hash: "0x1".to_string(),
            block_number: 0,
            timestamp: 0,
            amount_commitment: None,
            encrypted_amount: None,
        };
        let detected = detect_payment(&identity, &announcement).unwrap();
        let expected_key = to_array(&(scalar_of(3) + t).to_bytes());
        assert_eq!(detected.stealth_private_key.to_bytes(), expected_key);
    }

    /// Vector 2: felt hash layout for notes and amount commitments
    #[test]
    fn test_vector_2_hash_layouts() {
        let mut expected_nh = sha(&[&bytes_of(9), &[0u8; 32]]);
        expected_nh[0] &= 0x07;
        let nh = nullifier_hash(&Felt::from_u128(9));
        assert_eq!(nh.to_bytes(), expected_nh);

        let mut expected_commitment = sha(&[&bytes_of(4), &expected_nh]);
        expected_commitment[0] &= 0x07;
        assert_eq!(
            note_commitment(&Felt::from_u128(4), &nh).to_bytes(),
            expected_commitment
        );

        let mut expected_amount = sha(&[&bytes_of(100), &bytes_of(1)]);
        expected_amount[0] &= 0x07;
        assert_eq!(
            commit_amount(100, &Blinding::from_u128(1)).to_bytes(),
            expected_amount
        );
    }
}

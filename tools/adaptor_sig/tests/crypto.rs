use adaptor_sig::{
    adaptor_sign, combine, commit_nonce, complete_adaptor, derive_joint_key, generate_adaptor,
    partial_sign, recover_adaptor_secret, verify, verify_adaptor, AdaptorPoint, AdaptorSignature,
    JointKey, Keypair, NonceCommitment, Nonces, PartialSignature, Party, PublicKey, Signature,
};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::traits::Identity;

struct Pair {
    alice: Keypair,
    bob: Keypair,
    joint: JointKey,
}

fn pair() -> Pair {
    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let joint = derive_joint_key(alice.public(), bob.public()).unwrap();
    Pair { alice, bob, joint }
}

fn nonces(pair: &Pair, message: &[u8]) -> Nonces {
    Nonces {
        initiator: commit_nonce(&pair.alice, &pair.joint, message),
        responder: commit_nonce(&pair.bob, &pair.joint, message),
    }
}

fn flip(bytes: &mut [u8], index: usize) {
    bytes[index] ^= 0x01;
}

#[test]
fn joint_signature_verifies_under_aggregate() {
    for _ in 0..8 {
        let pair = pair();
        let message = b"refund transaction digest";
        let nonces = nonces(&pair, message);
        let a = partial_sign(&pair.alice, &pair.joint, Party::Initiator, &nonces, message).unwrap();
        let b = partial_sign(&pair.bob, &pair.joint, Party::Responder, &nonces, message).unwrap();

        let signature = combine(&nonces, [&a, &b]);
        assert!(verify(pair.joint.aggregate(), message, &signature));
        assert!(!verify(pair.joint.aggregate(), b"another digest", &signature));
    }
}

#[test]
fn joint_key_order_only_swaps_prime_keys() {
    let pair = pair();
    let swapped = derive_joint_key(pair.bob.public(), pair.alice.public()).unwrap();
    assert_eq!(pair.joint.aggregate(), swapped.aggregate());
    assert_eq!(
        pair.joint.prime_key(Party::Initiator),
        swapped.prime_key(Party::Responder)
    );
}

#[test]
fn single_signer_signature_is_plain_ed25519() {
    let keypair = Keypair::generate();
    let signature = keypair.sign(b"wallet input");
    assert!(verify(keypair.public(), b"wallet input", &signature));
    assert!(!verify(keypair.public(), b"wallet inputs", &signature));
}

#[test]
fn completed_adaptor_signature_verifies() {
    let pair = pair();
    let message = b"claim transaction digest";
    let nonces = nonces(&pair, message);
    let (secret, point) = generate_adaptor();
    assert!(secret.matches(&point));

    let bob_share =
        adaptor_sign(&pair.bob, &pair.joint, Party::Responder, &nonces, &point, message).unwrap();
    assert!(verify_adaptor(
        &pair.joint,
        Party::Responder,
        &nonces,
        &point,
        message,
        &bob_share
    ));

    let alice_share =
        adaptor_sign(&pair.alice, &pair.joint, Party::Initiator, &nonces, &point, message)
            .unwrap();
    let signature = complete_adaptor(&nonces, [&alice_share, &bob_share], &secret);
    assert!(verify(pair.joint.aggregate(), message, &signature));

    let recovered = recover_adaptor_secret(&signature, [&alice_share, &bob_share]).unwrap();
    assert_eq!(recovered, secret);
}

#[test]
fn adaptor_shares_without_secret_do_not_verify() {
    let pair = pair();
    let message = b"claim";
    let nonces = nonces(&pair, message);
    let (_, point) = generate_adaptor();
    let (wrong_secret, _) = generate_adaptor();

    let a = adaptor_sign(&pair.alice, &pair.joint, Party::Initiator, &nonces, &point, message)
        .unwrap();
    let b = adaptor_sign(&pair.bob, &pair.joint, Party::Responder, &nonces, &point, message)
        .unwrap();
    let signature = complete_adaptor(&nonces, [&a, &b], &wrong_secret);
    assert!(!verify(pair.joint.aggregate(), message, &signature));
}

#[test]
fn adaptor_verification_rejects_any_changed_input() {
    let pair = pair();
    let message = *b"0123456789abcdef0123456789abcdef";
    let nonces = nonces(&pair, &message);
    let (_, point) = generate_adaptor();
    let share =
        adaptor_sign(&pair.bob, &pair.joint, Party::Responder, &nonces, &point, &message).unwrap();
    let check = |nonces: &Nonces, point: &AdaptorPoint, message: &[u8]| {
        verify_adaptor(&pair.joint, Party::Responder, nonces, point, message, &share)
    };
    assert!(check(&nonces, &point, &message));

    let mut changed_message = message;
    flip(&mut changed_message, 7);
    assert!(!check(&nonces, &point, &changed_message));

    let (_, other_point) = generate_adaptor();
    assert!(!check(&nonces, &other_point, &message));

    let other = nonces_for_other_message(&pair);
    let swapped_initiator = Nonces {
        initiator: other.initiator,
        responder: nonces.responder,
    };
    assert!(!check(&swapped_initiator, &point, &message));
    let swapped_responder = Nonces {
        initiator: nonces.initiator,
        responder: other.responder,
    };
    assert!(!check(&swapped_responder, &point, &message));

    assert!(!verify_adaptor(
        &pair.joint,
        Party::Initiator,
        &nonces,
        &point,
        &message,
        &share
    ));
}

fn nonces_for_other_message(pair: &Pair) -> Nonces {
    nonces(pair, b"unrelated message")
}

#[test]
fn nonce_commitments_differ_per_message_and_joint_key() {
    let pair = pair();
    let first = commit_nonce(&pair.alice, &pair.joint, b"refund");
    let second = commit_nonce(&pair.alice, &pair.joint, b"claim");
    assert_ne!(first, second);
    assert_eq!(first, commit_nonce(&pair.alice, &pair.joint, b"refund"));

    let carol = Keypair::generate();
    let other_joint = derive_joint_key(pair.alice.public(), carol.public()).unwrap();
    assert_ne!(first, commit_nonce(&pair.alice, &other_joint, b"refund"));
}

#[test]
fn wire_encodings_are_hex_strings() {
    let pair = pair();
    let message = b"m";
    let nonces = nonces(&pair, message);
    let partial =
        partial_sign(&pair.alice, &pair.joint, Party::Initiator, &nonces, message).unwrap();
    let (_, point) = generate_adaptor();
    let share =
        adaptor_sign(&pair.bob, &pair.joint, Party::Responder, &nonces, &point, message).unwrap();

    let encoded = serde_json::to_string(pair.alice.public()).unwrap();
    assert_eq!(encoded.len(), 66);
    let key: PublicKey = serde_json::from_str(&encoded).unwrap();
    assert_eq!(&key, pair.alice.public());

    let nonce: NonceCommitment =
        serde_json::from_str(&serde_json::to_string(&nonces.initiator).unwrap()).unwrap();
    assert_eq!(nonce, nonces.initiator);
    let decoded: PartialSignature =
        serde_json::from_str(&serde_json::to_string(&partial).unwrap()).unwrap();
    assert_eq!(decoded, partial);
    let decoded: AdaptorSignature =
        serde_json::from_str(&serde_json::to_string(&share).unwrap()).unwrap();
    assert_eq!(decoded, share);
    let decoded: AdaptorPoint =
        serde_json::from_str(&serde_json::to_string(&point).unwrap()).unwrap();
    assert_eq!(decoded, point);
}

#[test]
fn rejects_truncated_signature() {
    assert!(Signature::from_slice(&[0u8; 63]).is_err());
    assert!(serde_json::from_str::<PublicKey>("\"abcd\"").is_err());
}

#[test]
fn rejects_small_order_point() {
    let identity = EdwardsPoint::identity().compress().to_bytes();
    assert!(PublicKey::from_compressed(identity).is_err());
    assert!(AdaptorPoint::from_compressed(identity).is_err());
}

#[test]
fn rejects_invalid_point_encoding() {
    // y = p (2^255 - 19) is non-canonical and must be rejected.
    let mut invalid = [0xffu8; 32];
    invalid[0] = 0xed;
    invalid[31] = 0x7f;
    assert!(PublicKey::from_compressed(invalid).is_err());
}

//! Property tests for key usage and request de-duplication

use proptest::prelude::*;
use tokensign::model::{
    ClientId, KeyUsage, NewCertRequest, NewCertificate, TokenDescriptor, TokenStatus,
};
use tokensign::{ErrorKind, RegistryState};

fn state_with_key() -> RegistryState {
    let mut state = RegistryState::new();
    state.create_token(&TokenDescriptor::software(TokenStatus::Ok));
    state.add_key("0", "K1", None).unwrap();
    state
}

fn usage() -> impl Strategy<Value = KeyUsage> {
    prop_oneof![Just(KeyUsage::Signing), Just(KeyUsage::Authentication)]
}

/// Attach a certificate (`true`) or a request (`false`) with a usage
fn attachment() -> impl Strategy<Value = (bool, KeyUsage)> {
    (any::<bool>(), usage())
}

fn member(code: u16) -> ClientId {
    format!("EE/BUSINESS/{code}").parse().unwrap()
}

proptest! {
    /// The first attachment fixes the usage; later ones either agree or fail
    #[test]
    fn prop_usage_is_fixed_by_first_attachment(
        attachments in prop::collection::vec(attachment(), 1..12),
    ) {
        let mut state = state_with_key();
        let fixed = attachments[0].1;

        for (n, (is_cert, usage)) in attachments.into_iter().enumerate() {
            let result = if is_cert {
                state
                    .add_certificate(
                        "K1",
                        NewCertificate::new(vec![n as u8, 0xCE]).saved(true).usage(usage),
                    )
                    .map(|_| ())
            } else {
                state
                    .add_certificate_request(
                        "K1",
                        usage,
                        NewCertRequest::new(Some(member(1234)), format!("CN=subject-{n}")),
                    )
                    .map(|_| ())
            };

            if usage == fixed {
                prop_assert!(result.is_ok());
            } else {
                let kind = result.unwrap_err().kind();
                prop_assert!(
                    kind == ErrorKind::UsageConflict || kind == ErrorKind::WrongCertificateUsage
                );
            }
            prop_assert_eq!(state.key("K1").unwrap().usage, Some(fixed));
        }
    }

    /// Repeating a (member, subject) request returns the first id and adds nothing
    #[test]
    fn prop_duplicate_requests_are_idempotent(
        code in 1000u16..9999,
        subject in "CN=[a-zA-Z0-9]{1,16}",
        repeats in 1usize..6,
    ) {
        let mut state = state_with_key();
        let first = state
            .add_certificate_request(
                "K1",
                KeyUsage::Signing,
                NewCertRequest::new(Some(member(code)), subject.clone()),
            )
            .unwrap();
        prop_assert!(first.is_new());

        for _ in 0..repeats {
            let again = state
                .add_certificate_request(
                    "K1",
                    KeyUsage::Signing,
                    NewCertRequest::new(Some(member(code)), subject.to_lowercase()),
                )
                .unwrap();
            prop_assert!(!again.is_new());
            prop_assert_eq!(again.id(), first.id());
        }
        prop_assert_eq!(state.key("K1").unwrap().cert_requests.len(), 1);
    }
}

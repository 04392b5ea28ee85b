//! End-to-end registry scenarios through the public API

use tokensign::authorization::{can_sign_for, find_signing_candidate, SelectionPolicy};
use tokensign::model::{
    ClientId, KeyUsage, NewCertRequest, NewCertificate, TokenDescriptor, TokenStatus,
};
use tokensign::{ErrorKind, TokenRegistry};

fn member() -> ClientId {
    "EE/BUSINESS/1234".parse().unwrap()
}

fn active_software_token() -> TokenRegistry {
    let registry = TokenRegistry::in_memory();
    registry.create_token(&TokenDescriptor::software(TokenStatus::Ok));
    registry.set_token_active("0", true).unwrap();
    registry
}

fn signing_key_for(registry: &TokenRegistry, member: &ClientId) -> Option<String> {
    registry.read(|state| {
        find_signing_candidate(state, member, SelectionPolicy::FirstMatch)
            .map(|candidate| candidate.key_id)
    })
}

#[test]
fn test_find_signing_key_follows_certificate_activation() {
    let registry = active_software_token();
    registry.add_key("0", "K1", None).unwrap();
    registry
        .add_certificate(
            "K1",
            NewCertificate::new(vec![0x30, 0x01])
                .id("C1")
                .member(member())
                .active(true)
                .saved(true),
        )
        .unwrap();

    assert_eq!(signing_key_for(&registry, &member()).as_deref(), Some("K1"));

    registry.set_certificate_active("C1", false).unwrap();
    assert_eq!(signing_key_for(&registry, &member()), None);
}

#[test]
fn test_request_fixes_usage_then_conflicts() {
    let registry = active_software_token();
    registry.add_key("0", "K2", None).unwrap();

    registry
        .add_certificate_request(
            "K2",
            KeyUsage::Signing,
            NewCertRequest::new(Some(member()), "CN=1234"),
        )
        .unwrap();
    assert_eq!(registry.get_key("K2").unwrap().usage, Some(KeyUsage::Signing));

    let err = registry
        .add_certificate_request(
            "K2",
            KeyUsage::Authentication,
            NewCertRequest::new(None, "CN=server"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsageConflict);
    assert_eq!(registry.get_key("K2").unwrap().usage, Some(KeyUsage::Signing));
    assert_eq!(registry.get_key("K2").unwrap().cert_requests.len(), 1);
}

#[test]
fn test_member_certificate_covers_subsystems() {
    let registry = active_software_token();
    registry.add_key("0", "K1", None).unwrap();
    registry
        .add_certificate(
            "K1",
            NewCertificate::new(vec![1]).member(member()).active(true).saved(true),
        )
        .unwrap();

    let subsystem: ClientId = "EE/BUSINESS/1234/PAYMENTS".parse().unwrap();
    assert_eq!(signing_key_for(&registry, &subsystem).as_deref(), Some("K1"));
    assert!(registry.read(|state| can_sign_for(state, "K1", &subsystem)));
}

#[test]
fn test_lookups_of_unknown_ids_are_not_found() {
    let registry = active_software_token();
    assert_eq!(registry.get_key("missing").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(registry.get_token("missing").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        registry.set_certificate_active("missing", true).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(!registry.remove_key("missing").unwrap());
    assert_eq!(registry.remove_certificate_request("missing").unwrap(), None);
}

#[test]
fn test_most_recently_activated_policy() {
    let registry = active_software_token();
    registry.add_key("0", "K1", None).unwrap();
    registry.add_key("0", "K2", None).unwrap();
    for (key_id, cert_id) in [("K1", "C1"), ("K2", "C2")] {
        registry
            .add_certificate(
                key_id,
                NewCertificate::new(cert_id.as_bytes().to_vec())
                    .id(cert_id)
                    .member(member())
                    .saved(true),
            )
            .unwrap();
    }
    registry.set_certificate_active("C1", true).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    registry.set_certificate_active("C2", true).unwrap();

    let chosen = registry.read(|state| {
        find_signing_candidate(state, &member(), SelectionPolicy::MostRecentlyActivated)
    });
    assert_eq!(chosen.unwrap().cert.id, "C2");

    let first = registry
        .read(|state| find_signing_candidate(state, &member(), SelectionPolicy::FirstMatch));
    assert_eq!(first.unwrap().cert.id, "C1");
}

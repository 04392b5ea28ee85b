//! Snapshot round trips through a JSON file

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokensign::adapters::JsonSnapshotStore;
use tokensign::authorization::find_signing_candidate;
use tokensign::logic::cert_hash;
use tokensign::model::{
    ClientId, KeyUsage, NewCertRequest, NewCertificate, TokenDescriptor, TokenStatus,
};
use tokensign::{SelectionPolicy, TokenRegistry};

fn member() -> ClientId {
    "EE/BUSINESS/1234".parse().unwrap()
}

fn open(path: &std::path::Path) -> TokenRegistry {
    TokenRegistry::load(Arc::new(JsonSnapshotStore::new(path)))
}

#[test]
fn test_transient_certificates_do_not_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyconf.json");

    let registry = open(&path);
    registry.create_token(&TokenDescriptor::software(TokenStatus::Ok));
    registry.add_key("0", "K1", None).unwrap();
    registry
        .add_certificate(
            "K1",
            NewCertificate::new(vec![1, 1]).id("SAVED").member(member()).saved(true),
        )
        .unwrap();
    registry
        .add_certificate("K1", NewCertificate::new(vec![2, 2]).id("TRANSIENT"))
        .unwrap();
    registry.persist().unwrap();

    let reloaded = open(&path);
    let key = reloaded.get_key("K1").unwrap();
    let ids: Vec<&str> = key.certs.iter().map(|cert| cert.id.as_str()).collect();
    assert_eq!(ids, vec!["SAVED"]);
    assert!(key.certs[0].saved_to_configuration);
    assert_eq!(key.certs[0].member_id, Some(member()));
}

#[test]
fn test_empty_keys_and_tokens_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyconf.json");

    let registry = open(&path);
    registry.create_token(&TokenDescriptor::software(TokenStatus::Ok));
    registry.add_key("0", "EMPTY", None).unwrap();
    registry.persist().unwrap();

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document["devices"], serde_json::json!([]));

    registry
        .add_certificate_request(
            "EMPTY",
            KeyUsage::Signing,
            NewCertRequest::new(Some(member()), "CN=1234"),
        )
        .unwrap();
    let reloaded = open(&path);
    assert_eq!(reloaded.get_key("EMPTY").unwrap().cert_requests.len(), 1);
}

fn most_recent_cert(registry: &TokenRegistry) -> Option<String> {
    registry.read(|state| {
        find_signing_candidate(state, &member(), SelectionPolicy::MostRecentlyActivated)
            .map(|candidate| candidate.cert.id)
    })
}

#[test]
fn test_most_recently_activated_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyconf.json");

    let registry = open(&path);
    registry.create_token(&TokenDescriptor::software(TokenStatus::Ok));
    registry.set_token_active("0", true).unwrap();
    registry.add_key("0", "K1", None).unwrap();
    for (id, der) in [("OLD", vec![1]), ("NEW", vec![2])] {
        registry
            .add_certificate("K1", NewCertificate::new(der).id(id).member(member()).saved(true))
            .unwrap();
    }
    registry.set_certificate_active("OLD", true).unwrap();
    thread::sleep(Duration::from_millis(5));
    registry.set_certificate_active("NEW", true).unwrap();
    registry.persist().unwrap();
    assert_eq!(most_recent_cert(&registry).as_deref(), Some("NEW"));

    let reloaded = open(&path);
    reloaded.set_token_available("0", true).unwrap();
    reloaded.set_token_active("0", true).unwrap();
    reloaded.set_key_available("K1", true).unwrap();
    assert_eq!(most_recent_cert(&reloaded).as_deref(), Some("NEW"));
}

#[test]
fn test_software_token_batch_signing_is_forced_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyconf.json");
    let contents = "AQID";
    fs::write(
        &path,
        format!(
            r#"{{
              "devices": [
                {{
                  "type": "softToken", "id": "0", "batchSigningEnabled": false,
                  "keys": [{{ "keyId": "K1", "usage": "SIGNING",
                             "certs": [{{ "memberId": "EE/BUSINESS/1234", "active": true,
                                         "status": "registered", "contents": "{contents}" }}] }}]
                }},
                {{
                  "type": "piv", "id": "12345", "batchSigningEnabled": false,
                  "keys": [{{ "keyId": "K2",
                             "certRequests": [{{ "subjectName": "CN=server" }}] }}]
                }}
              ]
            }}"#
        ),
    )
    .unwrap();

    let registry = open(&path);
    assert!(registry.get_token("0").unwrap().batch_signing_enabled);
    assert!(!registry.get_token("12345").unwrap().batch_signing_enabled);

    let cert = &registry.get_key("K1").unwrap().certs[0];
    assert_eq!(cert.id, cert_hash(&[1, 2, 3]));
    assert!(cert.saved_to_configuration);

    let request = &registry.get_key("K2").unwrap().cert_requests[0];
    assert!(!request.id.is_empty());
}

#[test]
fn test_malformed_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyconf.json");
    fs::write(&path, "{ definitely not json").unwrap();

    let registry = open(&path);
    assert!(registry.list_tokens().is_empty());
}

#[test]
fn test_missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(&dir.path().join("absent.json"));
    assert!(registry.list_tokens().is_empty());
}

#[test]
fn test_changes_from_another_process_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyconf.json");

    let first = open(&path);
    first.create_token(&TokenDescriptor::software(TokenStatus::Ok));
    first.add_key("0", "K1", None).unwrap();
    first
        .add_certificate("K1", NewCertificate::new(vec![1]).member(member()).saved(true))
        .unwrap();

    let second = open(&path);
    second.set_token_active("0", true).unwrap();

    first
        .add_certificate(
            "K1",
            NewCertificate::new(vec![2, 3, 4, 5]).member(member()).saved(true),
        )
        .unwrap();

    let added = second.merge_from_store().unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].der, vec![2, 3, 4, 5]);
    assert_eq!(second.get_key("K1").unwrap().certs.len(), 2);
    assert!(second.get_token("0").unwrap().active);
}

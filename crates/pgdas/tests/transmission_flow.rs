//! Upload retries, status polling and token reuse against a scripted gateway.

mod common {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use pgdas::clock::ManualClock;
    use pgdas::config::EndpointConfig;
    use pgdas::credentials::CredentialManager;
    use pgdas::declaration::{Declaration, DeclarationBody, DeclarationType, Period};
    use pgdas::transmission::TransmissionClient;
    use pgdas::transport::ScriptedTransport;
    use secrecy::SecretString;

    pub(super) const TOKEN: &str = r#"{"access_token":"abc","jwt_token":"jwt","expires_in":3600}"#;

    pub(super) struct Harness {
        pub(super) client: Arc<TransmissionClient>,
        pub(super) transport: Arc<ScriptedTransport>,
        pub(super) clock: Arc<ManualClock>,
    }

    /// Wires a client to `transport`. The caller scripts `/token` itself.
    pub(super) fn harness(transport: ScriptedTransport) -> Harness {
        let transport = Arc::new(transport);
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap(),
        ));
        let endpoints = EndpointConfig::with_base("https://gw.test/v1");
        let credentials = Arc::new(CredentialManager::new(
            endpoints.auth_url.clone(),
            "consumer",
            SecretString::from("secret".to_string()),
            transport.clone(),
            clock.clone(),
        ));
        let client = TransmissionClient::new(
            transport.clone(),
            credentials,
            endpoints,
            "99888777000166",
            SecretString::from("api-key".to_string()),
            clock.clone(),
        );
        Harness {
            client: Arc::new(client),
            transport,
            clock,
        }
    }

    pub(super) fn declaration() -> Declaration {
        Declaration {
            taxpayer_id: "11222333000181".to_string(),
            period: Period::new(2025, 5).expect("valid period"),
            transmit: true,
            compare: false,
            body: DeclarationBody {
                declaration_type: DeclarationType::Original,
                domestic_revenue: 0.0,
                export_revenue: 0.0,
                payroll: None,
                establishments: Vec::new(),
            },
        }
    }
}

use std::time::Duration;

use common::{declaration, harness, TOKEN};
use pgdas::transmission::{StatusPoller, TransmissionError};
use pgdas::transport::{RequestBody, ScriptedTransport};
use serde_json::{json, Value};

#[test]
fn server_errors_are_retried_with_linear_backoff() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Declarar", 503, "unavailable")
            .respond("/Declarar", 503, "unavailable")
            .respond("/Declarar", 200, r#"{"dados":"{}"}"#),
    );

    let response = h.client.send(&declaration()).expect("third attempt succeeds");

    assert_eq!(response.status, 200);
    assert_eq!(h.transport.requests_to("/Declarar").len(), 3);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(h.transport.requests_to("/token").len(), 1, "token is reused");
}

#[test]
fn client_errors_return_immediately() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Declarar", 404, r#"{"mensagens":[{"texto":"not found"}]}"#),
    );

    let response = h.client.send(&declaration()).expect("4xx is a response");

    assert_eq!(response.status, 404);
    assert!(response.is_permanent_rejection());
    assert_eq!(h.transport.requests_to("/Declarar").len(), 1);
    assert!(h.clock.sleeps().is_empty());
}

#[test]
fn exhausted_retries_keep_the_last_server_reply() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Declarar", 500, r#"{"erro":"interno"}"#),
    );

    let err = h.client.send(&declaration()).expect_err("never recovers");

    match &err {
        TransmissionError::Exhausted { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        err.last_response_body(),
        Some(json!({ "status": 500, "body": { "erro": "interno" } }))
    );
}

#[test]
fn declaration_travels_as_string_encoded_dados() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Declarar", 200, "{}"),
    );

    h.client.send(&declaration()).expect("sent");

    let sent = h.transport.requests_to("/Declarar");
    let RequestBody::Json(body) = &sent[0].body else {
        panic!("expected JSON body");
    };
    let envelope: Value = serde_json::from_str(body).expect("json envelope");
    assert_eq!(envelope["contratante"]["numero"], "99888777000166");
    assert_eq!(envelope["contribuinte"]["numero"], "11222333000181");
    assert_eq!(envelope["pedidoDados"]["idServico"], "TRANSDECLARACAO11");
    let dados: Value = serde_json::from_str(
        envelope["pedidoDados"]["dados"].as_str().expect("string dados"),
    )
    .expect("inner json");
    assert_eq!(dados["pa"], 202505);
    assert_eq!(dados["indicadorTransmissao"], true);
}

#[test]
fn poller_returns_the_first_finished_body() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Monitorar", 200, r#"{"situacao":"QUEUED"}"#)
            .respond("/Monitorar", 200, r#"{"situacao":"COMPLETED","dados":"{}"}"#),
    );
    let poller = StatusPoller::new(h.client.clone(), h.clock.clone())
        .with_timing(Duration::from_secs(4), Duration::from_secs(60));

    let body = poller.poll("req-1").expect("finished");

    assert_eq!(body["situacao"], "COMPLETED");
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(4)]);

    let RequestBody::Json(sent) = &h.transport.requests_to("/Monitorar")[0].body else {
        panic!("expected JSON body");
    };
    assert_eq!(sent, r#"{"idPedidoDados":"req-1"}"#);
}

#[test]
fn poller_gives_up_after_its_budget() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Monitorar", 200, r#"{"situacao":"QUEUED"}"#),
    );
    let poller = StatusPoller::new(h.client.clone(), h.clock.clone())
        .with_timing(Duration::from_secs(4), Duration::from_secs(10));

    let err = poller.poll("req-2").expect_err("times out");

    match &err {
        TransmissionError::PollTimeout {
            request_id,
            attempts,
            ..
        } => {
            assert_eq!(request_id, "req-2");
            assert_eq!(*attempts, 4);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.last_response_body(), Some(json!({ "situacao": "QUEUED" })));
    assert_eq!(h.clock.sleeps().len(), 3);
}

#[test]
fn poller_keeps_going_through_network_failures() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .fail("/Monitorar", "connection reset")
            .respond("/Monitorar", 200, r#"{"situacao":"CONCLUIDO"}"#),
    );
    let poller = StatusPoller::new(h.client.clone(), h.clock.clone());

    let body = poller.poll("req-3").expect("recovers");

    assert_eq!(body["situacao"], "CONCLUIDO");
    assert_eq!(h.transport.requests_to("/Monitorar").len(), 2);
}

#[test]
fn poller_stops_on_a_client_error() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Monitorar", 404, r#"{"mensagens":[{"texto":"not found"}]}"#),
    );
    let poller = StatusPoller::new(h.client.clone(), h.clock.clone());

    let err = poller.poll("req-5").expect_err("rejected");

    match &err {
        TransmissionError::PollRejected {
            request_id,
            response,
        } => {
            assert_eq!(request_id, "req-5");
            assert_eq!(response.status, 404);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        err.last_response_body(),
        Some(json!({ "status": 404, "body": { "mensagens": [{ "texto": "not found" }] } }))
    );
    assert_eq!(h.transport.requests_to("/Monitorar").len(), 1);
    assert!(h.clock.sleeps().is_empty());
}

#[test]
fn poller_waits_through_server_errors() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 200, TOKEN)
            .respond("/Monitorar", 503, "unavailable")
            .respond("/Monitorar", 200, r#"{"situacao":"CONCLUIDO"}"#),
    );
    let poller = StatusPoller::new(h.client.clone(), h.clock.clone());

    let body = poller.poll("req-6").expect("recovers");

    assert_eq!(body["situacao"], "CONCLUIDO");
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(4)]);
}

#[test]
fn short_lived_tokens_are_refreshed_between_polls() {
    let h = harness(
        ScriptedTransport::new()
            .respond(
                "/token",
                200,
                r#"{"access_token":"abc","jwt_token":"jwt","expires_in":61}"#,
            )
            .respond("/Monitorar", 200, r#"{"situacao":"PROCESSANDO"}"#)
            .respond("/Monitorar", 200, r#"{"situacao":"PROCESSANDO"}"#)
            .respond("/Monitorar", 200, r#"{"situacao":"CONCLUIDO"}"#),
    );
    let poller = StatusPoller::new(h.client.clone(), h.clock.clone())
        .with_timing(Duration::from_secs(4), Duration::from_secs(60));

    poller.poll("req-4").expect("finished");

    assert_eq!(h.transport.requests_to("/Monitorar").len(), 3);
    assert_eq!(h.transport.requests_to("/token").len(), 3);
}

#[test]
fn rejected_token_grant_stops_the_upload() {
    let h = harness(
        ScriptedTransport::new()
            .respond("/token", 401, "invalid client")
            .respond("/Declarar", 200, "{}"),
    );

    let err = h.client.send(&declaration()).expect_err("no token");

    assert!(matches!(err, TransmissionError::Authentication(_)));
    assert!(h.transport.requests_to("/Declarar").is_empty());
}

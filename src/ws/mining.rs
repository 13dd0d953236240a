//! Stratum method handlers: `mining.authorize` and `mining.subscribe`.

use serde_json::json;

use super::connection::Session;
use crate::domain::{ExtraNonce1, Subscription};
use crate::rpc::{RpcErrorKind, RpcRequest, RpcResponse};

const MINING_AUTHORIZE: &str = "mining.authorize";
const MINING_SUBSCRIBE: &str = "mining.subscribe";
const MINING_SET_DIFFICULTY: &str = "mining.set_difficulty";
const MINING_NOTIFY: &str = "mining.notify";

/// Shape of a `mining.subscribe` request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscribeIntent<'a> {
    /// Reclaim a prior subscription: `[subscriber, extraNonce1Hex]`.
    Resume {
        subscriber: &'a str,
        extra_nonce1_hex: &'a str,
    },
    /// Start a new subscription, under the given subscriber if any.
    New { subscriber: Option<&'a str> },
}

impl<'a> SubscribeIntent<'a> {
    fn classify(params: &'a [String]) -> Self {
        match params {
            [subscriber, extra_nonce1_hex] if !subscriber.is_empty() && !extra_nonce1_hex.is_empty() => {
                Self::Resume {
                    subscriber: subscriber.as_str(),
                    extra_nonce1_hex: extra_nonce1_hex.as_str(),
                }
            }
            _ => Self::New {
                subscriber: params.first().map(String::as_str).filter(|s| !s.is_empty()),
            },
        }
    }
}

impl Session {
    /// Routes a decoded request to its handler.
    pub(super) async fn dispatch(&self, req: RpcRequest) -> RpcResponse {
        match req.method.as_str() {
            MINING_AUTHORIZE => self.handle_mining_authorize(&req),
            MINING_SUBSCRIBE => self.handle_mining_subscribe(&req).await,
            other => {
                tracing::debug!(method = other, id = req.id, "method not found");
                RpcResponse::failure(Some(req.id), RpcErrorKind::MethodNotFound)
            }
        }
    }

    /// `mining.authorize(username, password)`.
    ///
    /// Only the parameter shape is checked; no credentials are verified.
    pub fn handle_mining_authorize(&self, req: &RpcRequest) -> RpcResponse {
        tracing::info!(id = req.id, "[mining.authorize] request");
        match req.params() {
            [username, _password] if !username.is_empty() => RpcResponse::success(req.id, json!(true)),
            _ => RpcResponse::failure(None, RpcErrorKind::InvalidParams),
        }
    }

    /// `mining.subscribe([subscriber[, extraNonce1Hex]])`.
    ///
    /// Binds the session's one subscription, either freshly created or
    /// resumed from a prior connection.
    pub async fn handle_mining_subscribe(&self, req: &RpcRequest) -> RpcResponse {
        tracing::info!(id = req.id, "[mining.subscribe] request");

        if self.subscription().is_some() {
            tracing::info!("already subscribed");
            return RpcResponse::failure(None, RpcErrorKind::InvalidParams);
        }

        let outcome = match SubscribeIntent::classify(req.params()) {
            SubscribeIntent::Resume {
                subscriber,
                extra_nonce1_hex,
            } => self.resume_subscription(subscriber, extra_nonce1_hex).await,
            SubscribeIntent::New { subscriber } => self.new_subscription(subscriber).await,
        };

        match outcome {
            Ok(subscription) => {
                let result = subscription_result(&subscription);
                if self.bind_subscription(subscription) {
                    RpcResponse::success(req.id, result)
                } else {
                    RpcResponse::failure(None, RpcErrorKind::InvalidParams)
                }
            }
            Err(kind) => RpcResponse::failure(None, kind),
        }
    }

    async fn resume_subscription(
        &self,
        subscriber: &str,
        extra_nonce1_hex: &str,
    ) -> Result<Subscription, RpcErrorKind> {
        let extra_nonce1 = ExtraNonce1::from_hex(extra_nonce1_hex).map_err(|e| {
            tracing::info!(extra_nonce1 = extra_nonce1_hex, error = %e, "extraNonce1 is not hexadecimal");
            RpcErrorKind::InvalidParams
        })?;

        let existing = self
            .service()
            .lookup_existing(subscriber, extra_nonce1)
            .await
            .map_err(|_| RpcErrorKind::Internal)?
            .ok_or(RpcErrorKind::InvalidParams)?;

        if existing.active_session {
            tracing::info!(subscriber, %extra_nonce1, "subscription is already active");
            return Err(RpcErrorKind::InvalidParams);
        }

        self.service()
            .claim(subscriber, extra_nonce1)
            .await
            .map_err(|_| RpcErrorKind::Internal)?
            .ok_or(RpcErrorKind::InvalidParams)
    }

    async fn new_subscription(&self, subscriber: Option<&str>) -> Result<Subscription, RpcErrorKind> {
        let subscriber = subscriber.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        self.service()
            .create_new(&subscriber)
            .await
            .map_err(|_| RpcErrorKind::Internal)
    }
}

/// `[[["mining.set_difficulty", d], ["mining.notify", n]], extraNonce1Hex, extraNonce2]`
fn subscription_result(subscription: &Subscription) -> serde_json::Value {
    json!([
        [
            [MINING_SET_DIFFICULTY, subscription.set_difficulty],
            [MINING_NOTIFY, subscription.notify],
        ],
        subscription.extra_nonce1.to_string(),
        subscription.extra_nonce2,
    ])
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::domain::NewSubscription;
    use crate::error::GatewayError;
    use crate::persistence::{InMemorySubscriptionStore, SubscriptionStore};
    use crate::service::SubscriptionService;
    use crate::ws::outbound::{OutboundQueue, OutboundReceiver};

    fn session_with(store: Arc<dyn SubscriptionStore>) -> (Session, OutboundReceiver) {
        let (outbound, rx) = OutboundQueue::bounded(8);
        let service = Arc::new(SubscriptionService::new(store));
        (Session::new(service, outbound), rx)
    }

    fn new_session() -> (Session, Arc<InMemorySubscriptionStore>) {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let (session, _rx) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        (session, store)
    }

    fn request(id: i64, method: &str, params: &[&str]) -> RpcRequest {
        RpcRequest {
            id,
            method: method.to_string(),
            params: Some(params.iter().map(|p| (*p).to_string()).collect()),
        }
    }

    fn extra_nonce1_of(resp: &RpcResponse) -> ExtraNonce1 {
        let Some(hex) = resp
            .result
            .as_ref()
            .and_then(|r| r.pointer("/1"))
            .and_then(Value::as_str)
        else {
            panic!("not a subscription result: {resp:?}");
        };
        let Ok(nonce) = ExtraNonce1::from_hex(hex) else {
            panic!("extraNonce1 is not hex: {hex}");
        };
        nonce
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl SubscriptionStore for BrokenStore {
        async fn fetch(
            &self,
            _subscriber: &str,
            _extra_nonce1: ExtraNonce1,
        ) -> Result<Option<Subscription>, GatewayError> {
            Err(GatewayError::PersistenceError("broken".to_string()))
        }

        async fn create(&self, _new: NewSubscription) -> Result<Subscription, GatewayError> {
            Err(GatewayError::PersistenceError("broken".to_string()))
        }

        async fn set_active_session(
            &self,
            _extra_nonce1: ExtraNonce1,
            _active: bool,
        ) -> Result<bool, GatewayError> {
            Err(GatewayError::PersistenceError("broken".to_string()))
        }

        async fn claim(
            &self,
            _subscriber: &str,
            _extra_nonce1: ExtraNonce1,
        ) -> Result<Option<Subscription>, GatewayError> {
            Err(GatewayError::PersistenceError("broken".to_string()))
        }
    }

    /// In-memory store that yields after every lookup, as a database round
    /// trip would, so concurrent resumes interleave.
    #[derive(Debug, Default)]
    struct YieldingStore {
        inner: InMemorySubscriptionStore,
    }

    #[async_trait]
    impl SubscriptionStore for YieldingStore {
        async fn fetch(
            &self,
            subscriber: &str,
            extra_nonce1: ExtraNonce1,
        ) -> Result<Option<Subscription>, GatewayError> {
            let found = self.inner.fetch(subscriber, extra_nonce1).await;
            tokio::task::yield_now().await;
            found
        }

        async fn create(&self, new: NewSubscription) -> Result<Subscription, GatewayError> {
            self.inner.create(new).await
        }

        async fn set_active_session(
            &self,
            extra_nonce1: ExtraNonce1,
            active: bool,
        ) -> Result<bool, GatewayError> {
            self.inner.set_active_session(extra_nonce1, active).await
        }

        async fn claim(
            &self,
            subscriber: &str,
            extra_nonce1: ExtraNonce1,
        ) -> Result<Option<Subscription>, GatewayError> {
            self.inner.claim(subscriber, extra_nonce1).await
        }
    }

    #[test]
    fn classify_resume_needs_two_non_empty_params() {
        let params = ["w".to_string(), "0a".to_string()];
        assert_eq!(
            SubscribeIntent::classify(&params),
            SubscribeIntent::Resume {
                subscriber: "w",
                extra_nonce1_hex: "0a",
            }
        );

        let params = ["w".to_string(), String::new()];
        assert_eq!(
            SubscribeIntent::classify(&params),
            SubscribeIntent::New { subscriber: Some("w") }
        );

        let params = [String::new()];
        assert_eq!(SubscribeIntent::classify(&params), SubscribeIntent::New { subscriber: None });
        assert_eq!(SubscribeIntent::classify(&[]), SubscribeIntent::New { subscriber: None });

        let params = ["w".to_string(), "0a".to_string(), "extra".to_string()];
        assert_eq!(
            SubscribeIntent::classify(&params),
            SubscribeIntent::New { subscriber: Some("w") }
        );
    }

    #[tokio::test]
    async fn authorize_accepts_username_and_password() {
        let (session, _) = new_session();
        let resp = session.handle_mining_authorize(&request(5, MINING_AUTHORIZE, &["user", "pw"]));
        assert_eq!(resp, RpcResponse::success(5, json!(true)));
    }

    #[tokio::test]
    async fn authorize_rejects_bad_shapes() {
        let (session, _) = new_session();
        for params in [&["user"][..], &[], &["", "pw"], &["user", "pw", "x"]] {
            let resp = session.handle_mining_authorize(&request(1, MINING_AUTHORIZE, params));
            assert_eq!(resp, RpcResponse::failure(None, RpcErrorKind::InvalidParams));
        }
        assert!(session.subscription().is_none());
    }

    #[tokio::test]
    async fn new_subscription_renders_result_and_blocks_resubscribe() {
        let (session, store) = new_session();
        let resp = session
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &[]))
            .await;

        assert_eq!(resp.id, Some(1));
        let Some(result) = resp.result.as_ref() else {
            panic!("expected success: {resp:?}");
        };
        let Some(hex) = result.pointer("/1").and_then(Value::as_str) else {
            panic!("missing extraNonce1");
        };
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(result.pointer("/2"), Some(&json!(4)));
        assert_eq!(result.pointer("/0/0/0"), Some(&json!(MINING_SET_DIFFICULTY)));
        assert_eq!(result.pointer("/0/1/0"), Some(&json!(MINING_NOTIFY)));

        let Some(bound) = session.subscription() else {
            panic!("subscription should be bound");
        };
        assert_eq!(result.pointer("/0/0/1"), Some(&json!(bound.set_difficulty)));
        assert_eq!(result.pointer("/0/1/1"), Some(&json!(bound.notify)));
        assert_eq!(store.len().await, 1);

        let again = session
            .handle_mining_subscribe(&request(2, MINING_SUBSCRIBE, &[]))
            .await;
        assert_eq!(again, RpcResponse::failure(None, RpcErrorKind::InvalidParams));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn new_subscription_keeps_client_subscriber() {
        let (session, _) = new_session();
        let _ = session
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["rig-7"]))
            .await;
        let Some(bound) = session.subscription() else {
            panic!("subscription should be bound");
        };
        assert_eq!(bound.subscriber, "rig-7");
    }

    #[tokio::test]
    async fn new_subscription_generates_subscriber_when_absent() {
        let (session, _) = new_session();
        let _ = session
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &[""]))
            .await;
        let Some(bound) = session.subscription() else {
            panic!("subscription should be bound");
        };
        assert!(uuid::Uuid::parse_str(&bound.subscriber).is_ok());
    }

    #[tokio::test]
    async fn resume_of_unknown_row_is_invalid_params() {
        let (session, _) = new_session();
        let resp = session
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["ghost", "0000002a"]))
            .await;
        assert_eq!(resp, RpcResponse::failure(None, RpcErrorKind::InvalidParams));
        assert!(session.subscription().is_none());
    }

    #[tokio::test]
    async fn resume_with_non_hex_nonce_is_invalid_params() {
        let (session, _) = new_session();
        let resp = session
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["worker", "not-hex"]))
            .await;
        assert_eq!(resp.error_code(), Some(RpcErrorKind::InvalidParams.code()));
    }

    #[tokio::test]
    async fn resume_of_active_subscription_is_rejected() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let (first, _rx1) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let created = first
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["worker"]))
            .await;
        let hex = extra_nonce1_of(&created).to_string();

        let (second, _rx2) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let resp = second
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["worker", &hex]))
            .await;
        assert_eq!(resp, RpcResponse::failure(None, RpcErrorKind::InvalidParams));
        assert!(second.subscription().is_none());
    }

    #[tokio::test]
    async fn resume_after_deactivation_reclaims_row() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let (first, _rx1) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let created = first
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["worker"]))
            .await;
        let extra_nonce1 = extra_nonce1_of(&created);
        let Some(sub) = first.subscription() else {
            panic!("subscription should be bound");
        };
        first.service().deactivate(sub).await;

        let (second, _rx2) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let hex = extra_nonce1.to_string();
        let resumed = second
            .handle_mining_subscribe(&request(9, MINING_SUBSCRIBE, &["worker", &hex]))
            .await;
        assert_eq!(resumed.id, Some(9));
        assert_eq!(extra_nonce1_of(&resumed), extra_nonce1);
        assert_eq!(resumed.result, created.result);

        let Some(row) = store.get(extra_nonce1).await else {
            panic!("row should exist");
        };
        assert!(row.active_session);
    }

    #[tokio::test]
    async fn concurrent_resumes_bind_exactly_one_session() {
        let store = Arc::new(YieldingStore::default());
        let Ok(sub) = store
            .create(NewSubscription {
                extra_nonce2: 4,
                set_difficulty: "d".to_string(),
                notify: "n".to_string(),
                subscriber: "rig".to_string(),
            })
            .await
        else {
            panic!("create should succeed");
        };
        assert!(matches!(store.set_active_session(sub.extra_nonce1, false).await, Ok(false)));
        let hex = sub.extra_nonce1.to_string();
        assert_eq!(hex, "00000001");

        let (a, _rx_a) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let (b, _rx_b) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let req = request(1, MINING_SUBSCRIBE, &["rig", &hex]);
        let (resp_a, resp_b) = tokio::join!(
            a.handle_mining_subscribe(&req),
            b.handle_mining_subscribe(&req)
        );

        let successes = [&resp_a, &resp_b].iter().filter(|r| r.error.is_none()).count();
        assert_eq!(successes, 1, "a: {resp_a:?}, b: {resp_b:?}");
        let bound = [&a, &b].iter().filter(|s| s.subscription().is_some()).count();
        assert_eq!(bound, 1);

        let loser = if resp_a.error.is_some() { resp_a } else { resp_b };
        assert_eq!(loser, RpcResponse::failure(None, RpcErrorKind::InvalidParams));
    }

    #[tokio::test]
    async fn resume_with_wrong_subscriber_is_invalid_params() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let (first, _rx1) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let created = first
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["worker"]))
            .await;
        let hex = extra_nonce1_of(&created).to_string();

        let (second, _rx2) = session_with(Arc::clone(&store) as Arc<dyn SubscriptionStore>);
        let resp = second
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &["someone-else", &hex]))
            .await;
        assert_eq!(resp.error_code(), Some(RpcErrorKind::InvalidParams.code()));
    }

    #[tokio::test]
    async fn store_failures_are_internal_errors() {
        let (session, _rx) = session_with(Arc::new(BrokenStore));
        let created = session
            .handle_mining_subscribe(&request(1, MINING_SUBSCRIBE, &[]))
            .await;
        assert_eq!(created, RpcResponse::failure(None, RpcErrorKind::Internal));

        let resumed = session
            .handle_mining_subscribe(&request(2, MINING_SUBSCRIBE, &["worker", "01"]))
            .await;
        assert_eq!(resumed, RpcResponse::failure(None, RpcErrorKind::Internal));
        assert!(session.subscription().is_none());
    }

    #[tokio::test]
    async fn dispatch_routes_unknown_methods() {
        let (session, _) = new_session();
        let resp = session.dispatch(request(4, "mining.submit", &[])).await;
        assert_eq!(resp, RpcResponse::failure(Some(4), RpcErrorKind::MethodNotFound));
    }

    #[tokio::test]
    async fn handle_message_queues_exactly_one_response() {
        let store: Arc<dyn SubscriptionStore> = Arc::new(InMemorySubscriptionStore::new());
        let (session, mut rx) = session_with(store);

        session.handle_message(br#"{"id":0,"method":"mining.subscribe"}"#).await;

        let Some(raw) = rx.recv().await else {
            panic!("a response should be queued");
        };
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            panic!("response should be json");
        };
        assert_eq!(value.pointer("/error/code"), Some(&json!(-32600)));
        assert_eq!(value.pointer("/id"), None);

        let second = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
        assert!(second.is_err(), "only one response per request");
    }
}

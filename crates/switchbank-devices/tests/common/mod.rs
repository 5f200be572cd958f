//! Common test utilities for switchbank tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use switchbank_devices::{
    Credentials, DeviceError, EncoderRegistry, MetadataDigest, N2kMessage, Pgn127502Encoder,
    PublishMethod, RemoteTransport, Result, SwitchbankEncoder,
};
use tokio::time::Instant;

/// Options with one 8-channel relay bank (instance 10) under root `root.`.
pub fn relay_options() -> Value {
    json!({
        "root": "root.",
        "switchbanks": [{
            "instance": 10,
            "type": "relay",
            "channelCount": 8,
            "channels": (1..=8).map(|i| json!({"index": i})).collect::<Vec<_>>()
        }]
    })
}

/// PGN 127502 encoder recording every call.
#[derive(Default)]
pub struct RecordingEncoder {
    inner: Pgn127502Encoder,
    pub calls: Mutex<Vec<(u8, Vec<bool>)>>,
}

impl RecordingEncoder {
    pub fn calls(&self) -> Vec<(u8, Vec<bool>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SwitchbankEncoder for RecordingEncoder {
    fn pgn(&self) -> u32 {
        self.inner.pgn()
    }

    fn encode(&self, instance: u8, states: &[bool]) -> Result<N2kMessage> {
        self.calls.lock().unwrap().push((instance, states.to_vec()));
        self.inner.encode(instance, states)
    }
}

/// Registry holding only `encoder`.
pub fn registry_with(encoder: Arc<RecordingEncoder>) -> EncoderRegistry {
    let mut registry = EncoderRegistry::empty();
    registry.register(encoder);
    registry
}

/// Scripted response of a fake delivery.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    TransportError,
}

/// Remote transport answering from a script.
pub struct FakeTransport {
    replies: Mutex<VecDeque<Reply>>,
    pub deliveries: Mutex<Vec<Instant>>,
    pub logins: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            deliveries: Mutex::new(Vec::new()),
            logins: Mutex::new(Vec::new()),
        })
    }

    pub fn always(status: u16) -> Arc<Self> {
        Self::new(vec![Reply::Status(status); 16])
    }

    pub fn delivery_times(&self) -> Vec<Instant> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn authenticate(&self, _url: &str, credentials: &Credentials) -> Result<String> {
        self.logins.lock().unwrap().push(credentials.username.clone());
        Ok("token-1".to_string())
    }

    async fn deliver(
        &self,
        _method: PublishMethod,
        _url: &str,
        token: &str,
        _digest: &MetadataDigest,
    ) -> Result<u16> {
        assert_eq!(token, "token-1");
        self.deliveries.lock().unwrap().push(Instant::now());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Status(status)) => Ok(status),
            Some(Reply::TransportError) => Err(DeviceError::Http("connection refused".into())),
            None => Ok(500),
        }
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

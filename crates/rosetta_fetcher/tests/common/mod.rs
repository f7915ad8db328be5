//! In-memory data API used by the integration tests.

#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use rosetta_fetcher::transport::{Transport, TransportError};
use rosetta_fetcher::types::{
    ApiError, Block, BlockIdentifier, BlockRequest, BlockResponse, BlockTransactionRequest,
    BlockTransactionResponse, MetadataRequest, NetworkListResponse, NetworkOptionsResponse,
    NetworkRequest, NetworkStatusResponse, Operation, OperationIdentifier, Transaction,
    TransactionIdentifier,
};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub fn load_fixture<T: serde::de::DeserializeOwned>(path: &str) -> T {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata");
    let full = root.join(path);
    let s =
        std::fs::read_to_string(&full).unwrap_or_else(|e| panic!("read {}: {}", full.display(), e));
    serde_json::from_str(&s).unwrap_or_else(|e| panic!("parse {}: {}", path, e))
}

/// Serve `responses` verbatim to successive connections, one response per
/// connection, closing each afterwards. Returns the base URL.
pub fn serve_raw(responses: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream);
            stream.write_all(response.as_bytes()).unwrap();
        }
    });
    format!("http://{addr}")
}

fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                return;
            }
        }
    }
}

/// A complete JSON response that closes the connection.
pub fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// How a scripted endpoint misbehaves.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Fail transiently this many times, then answer.
    Flaky(u32),
    /// Always fail transiently.
    Unavailable,
    /// Always fail with a non-retriable API error.
    Broken,
    /// Always fail with an API error missing from the network's catalogue.
    Undeclared,
    /// Answer after a delay.
    Slow(Duration),
}

pub struct MockTransport {
    pub networks: NetworkListResponse,
    pub status: NetworkStatusResponse,
    pub options: NetworkOptionsResponse,
    pub blocks: HashMap<i64, BlockResponse>,
    pub transactions: HashMap<String, Transaction>,
    faults: Mutex<HashMap<String, Fault>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Fixture network plus a generated chain of `len` blocks; block 3 comes
    /// from the fixture and reports other transactions.
    pub fn with_chain(len: i64) -> Self {
        let mut blocks: HashMap<i64, BlockResponse> = (0..len)
            .map(|i| {
                (
                    i,
                    BlockResponse {
                        block: Some(block(i)),
                        other_transactions: None,
                    },
                )
            })
            .collect();
        let mut transactions = HashMap::new();
        if len > 3 {
            blocks.insert(3, load_fixture("block_with_other_transactions.json"));
            let others: Vec<Transaction> = load_fixture("other_transactions.json");
            for tx in others {
                transactions.insert(tx.transaction_identifier.hash.clone(), tx);
            }
        }
        Self {
            networks: load_fixture("network_list.json"),
            status: load_fixture("network_status.json"),
            options: load_fixture("network_options.json"),
            blocks,
            transactions,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fault(&self, key: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(key.to_string(), fault);
    }

    /// Every call made so far, as `endpoint` or `endpoint:key`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    async fn respond<T>(&self, key: String, value: Option<T>) -> Result<T, TransportError> {
        self.calls.lock().unwrap().push(key.clone());
        let fault = {
            let mut faults = self.faults.lock().unwrap();
            match faults.get_mut(&key) {
                Some(Fault::Flaky(0)) => {
                    faults.remove(&key);
                    None
                }
                Some(Fault::Flaky(n)) => {
                    *n -= 1;
                    Some(Fault::Unavailable)
                }
                other => other.cloned(),
            }
        };
        match fault {
            Some(Fault::Unavailable) => {
                return Err(TransportError::Status {
                    status: 503,
                    body: format!("{key} unavailable"),
                })
            }
            Some(Fault::Broken) => return Err(api_error(13, "block not found", false)),
            Some(Fault::Undeclared) => return Err(api_error(99, "database locked", true)),
            Some(Fault::Slow(d)) => tokio::time::sleep(d).await,
            Some(Fault::Flaky(_)) | None => {}
        }
        value.ok_or_else(|| api_error(13, "not found", false))
    }
}

fn api_error(code: i32, message: &str, retriable: bool) -> TransportError {
    TransportError::Api(Box::new(ApiError {
        code,
        message: message.into(),
        description: None,
        retriable,
        details: None,
    }))
}

/// Generated block at `index` with one inline transaction.
pub fn block(index: i64) -> Block {
    let parent = (index - 1).max(0);
    Block {
        block_identifier: BlockIdentifier::new(index, format!("block {index}")),
        parent_block_identifier: BlockIdentifier::new(parent, format!("block {parent}")),
        timestamp: 1_600_000_000_000 + index * 1000,
        transactions: vec![Transaction {
            transaction_identifier: TransactionIdentifier::new(format!("coinbase-{index}")),
            operations: vec![Operation {
                operation_identifier: OperationIdentifier {
                    index: 0,
                    network_index: None,
                },
                related_operations: None,
                kind: "COINBASE".into(),
                status: Some("SUCCESS".into()),
                account: None,
                amount: None,
                metadata: None,
            }],
            metadata: None,
        }],
        metadata: None,
    }
}

impl Transport for MockTransport {
    fn network_list<'a>(
        &'a self,
        _request: &'a MetadataRequest,
    ) -> BoxFuture<'a, Result<NetworkListResponse, TransportError>> {
        self.respond("network_list".into(), Some(self.networks.clone()))
            .boxed()
    }

    fn network_status<'a>(
        &'a self,
        _request: &'a NetworkRequest,
    ) -> BoxFuture<'a, Result<NetworkStatusResponse, TransportError>> {
        self.respond("network_status".into(), Some(self.status.clone()))
            .boxed()
    }

    fn network_options<'a>(
        &'a self,
        _request: &'a NetworkRequest,
    ) -> BoxFuture<'a, Result<NetworkOptionsResponse, TransportError>> {
        self.respond("network_options".into(), Some(self.options.clone()))
            .boxed()
    }

    fn block<'a>(
        &'a self,
        request: &'a BlockRequest,
    ) -> BoxFuture<'a, Result<BlockResponse, TransportError>> {
        let current = self.status.current_block_identifier.index;
        let index = request.block_identifier.index.unwrap_or(current);
        self.respond(format!("block:{index}"), self.blocks.get(&index).cloned())
            .boxed()
    }

    fn block_transaction<'a>(
        &'a self,
        request: &'a BlockTransactionRequest,
    ) -> BoxFuture<'a, Result<BlockTransactionResponse, TransportError>> {
        let hash = &request.transaction_identifier.hash;
        let tx = self
            .transactions
            .get(hash)
            .cloned()
            .map(|transaction| BlockTransactionResponse { transaction });
        self.respond(format!("tx:{hash}"), tx).boxed()
    }
}

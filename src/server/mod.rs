//! gRPC front end of the commit log (`log.v1.Log`).

pub mod config;

pub use self::config::ServerConfig;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, warn};

use crate::api::v1::log_server::Log as LogService;
use crate::api::{
    ConsumeRequest, ConsumeResponse, Metrics, MetricsRequest, MetricsResponse, ProduceRequest,
    ProduceResponse,
};
use crate::common::Error;
use crate::storage::CommitLog;

pub use crate::api::v1::log_server::LogServer;

/// Responses buffered per stream before the sender waits on the client.
const STREAM_BUFFER: usize = 64;

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::OffsetOutOfRange(_) => Status::out_of_range(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct LogStatus {
    // RelaxedCounter is more suitable for counting metrics
    records_produced: Arc<RelaxedCounter>,
    records_consumed: Arc<RelaxedCounter>,
    bytes_produced: Arc<AtomicUsize>,
}

impl LogStatus {
    pub fn new() -> Self {
        LogStatus {
            records_produced: Arc::new(RelaxedCounter::new(0)),
            records_consumed: Arc::new(RelaxedCounter::new(0)),
            bytes_produced: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for LogStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves a shared commit log over gRPC.
pub struct HomeLogServer<L> {
    log: Arc<L>,
    status: LogStatus,
    poll_interval: Duration,
}

impl<L: CommitLog + 'static> HomeLogServer<L> {
    pub fn new(log: Arc<L>) -> Self {
        HomeLogServer {
            log,
            status: LogStatus::new(),
            poll_interval: ServerConfig::default().consume_poll_interval(),
        }
    }

    /// Sets how long `ConsumeStream` waits before retrying an offset that
    /// has not been written yet.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

// Log calls block on file and mmap I/O, so they run off the async workers.
async fn produce<L: CommitLog + 'static>(
    log: Arc<L>,
    status: &LogStatus,
    req: ProduceRequest,
) -> Result<ProduceResponse, Status> {
    let record = req
        .record
        .ok_or_else(|| Status::invalid_argument("produce request without a record"))?;
    let size = record.value.len();

    let offset = tokio::task::spawn_blocking(move || log.append(record))
        .await
        .map_err(Error::from)??;

    status.records_produced.inc();
    status.bytes_produced.fetch_add(size, Ordering::Relaxed);
    Ok(ProduceResponse { offset })
}

async fn consume<L: CommitLog + 'static>(
    log: Arc<L>,
    status: &LogStatus,
    offset: u64,
) -> Result<ConsumeResponse, Error> {
    let record = tokio::task::spawn_blocking(move || log.read(offset)).await??;
    status.records_consumed.inc();
    Ok(ConsumeResponse {
        record: Some(record),
    })
}

#[async_trait]
impl<L: CommitLog + 'static> LogService for HomeLogServer<L> {
    async fn produce(
        &self,
        request: Request<ProduceRequest>,
    ) -> std::result::Result<Response<ProduceResponse>, Status> {
        let res = produce(self.log.clone(), &self.status, request.into_inner()).await?;
        Ok(Response::new(res))
    }

    async fn consume(
        &self,
        request: Request<ConsumeRequest>,
    ) -> std::result::Result<Response<ConsumeResponse>, Status> {
        let offset = request.into_inner().offset;
        let res = consume(self.log.clone(), &self.status, offset).await?;
        Ok(Response::new(res))
    }

    type ProduceStreamStream = ReceiverStream<Result<ProduceResponse, Status>>;

    async fn produce_stream(
        &self,
        request: Request<Streaming<ProduceRequest>>,
    ) -> std::result::Result<Response<Self::ProduceStreamStream>, Status> {
        let mut stream = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let log = self.log.clone();
        let status = self.status.clone();

        tokio::spawn(async move {
            loop {
                let req = match stream.message().await {
                    Ok(Some(req)) => req,
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                };
                let res = produce(log.clone(), &status, req).await;
                let failed = res.is_err();
                if tx.send(res).await.is_err() || failed {
                    break;
                }
            }
            debug!("produce-stream-closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type ConsumeStreamStream = ReceiverStream<Result<ConsumeResponse, Status>>;

    /// Streams records from the requested offset onwards.
    ///
    /// Offsets that are not written yet are polled every `poll_interval`
    /// until they show up. The stream only ends when the client goes away
    /// or a read fails for another reason.
    async fn consume_stream(
        &self,
        request: Request<ConsumeRequest>,
    ) -> std::result::Result<Response<Self::ConsumeStreamStream>, Status> {
        let mut offset = request.into_inner().offset;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let log = self.log.clone();
        let status = self.status.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            loop {
                let res = match consume(log.clone(), &status, offset).await {
                    Ok(res) => Ok(res),
                    Err(err) if err.is_not_yet_available() => {
                        tokio::select! {
                            _ = tx.closed() => break,
                            _ = tokio::time::sleep(poll_interval) => continue,
                        }
                    }
                    Err(err) => {
                        warn!(offset = offset, err = %err, "consume-stream-failed");
                        Err(Status::from(err))
                    }
                };
                let failed = res.is_err();
                if tx.send(res).await.is_err() || failed {
                    break;
                }
                offset += 1;
            }
            debug!(offset = offset, "consume-stream-closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn metrics(
        &self,
        _request: Request<MetricsRequest>,
    ) -> std::result::Result<Response<MetricsResponse>, Status> {
        let log = self.log.clone();
        let (lowest_offset, highest_offset) = tokio::task::spawn_blocking(move || {
            Ok::<_, Error>((log.lowest_offset()?, log.highest_offset()?))
        })
        .await
        .map_err(Error::from)??;

        Ok(Response::new(MetricsResponse {
            metrics: Some(Metrics {
                records_produced: self.status.records_produced.get() as u64,
                records_consumed: self.status.records_consumed.get() as u64,
                bytes_produced: self.status.bytes_produced.load(Ordering::Relaxed) as u64,
                lowest_offset,
                highest_offset,
            }),
        }))
    }
}

/// Resolves once `signal` fires. A signal that cannot be installed
/// resolves at once, after logging why.
pub async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => debug!("shutdown-signal-received"),
        Err(err) => warn!(error=%err, "shutdown-signal-unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::transport::{Channel, Server};
    use tonic::Code;

    use super::{shutdown_signal, HomeLogServer, LogServer};
    use crate::api::v1::log_client::LogClient;
    use crate::api::{ConsumeRequest, MetricsRequest, ProduceRequest, Record};
    use crate::storage::commitlog::{Config, Log};

    async fn setup_test(dir: &std::path::Path) -> (LogClient<Channel>, Arc<Log>) {
        let log = Arc::new(Log::open(dir, Config::default()).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HomeLogServer::new(log.clone()).with_poll_interval(Duration::from_millis(5));
        tokio::spawn(async move {
            Server::builder()
                .add_service(LogServer::new(server))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });

        let client = LogClient::connect(format!("http://{}", addr)).await.unwrap();
        (client, log)
    }

    fn produce_request(value: &str) -> ProduceRequest {
        ProduceRequest {
            record: Some(Record::new(value)),
        }
    }

    #[tokio::test]
    async fn test_produce_consume() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _log) = setup_test(dir.path()).await;

        let res = client.produce(produce_request("hello world")).await.unwrap();
        let offset = res.into_inner().offset;
        assert_eq!(offset, 0);

        let res = client.consume(ConsumeRequest { offset }).await.unwrap();
        let record = res.into_inner().record.unwrap();
        assert_eq!(record.value, b"hello world".to_vec());
        assert_eq!(record.offset, offset);
    }

    #[tokio::test]
    async fn test_consume_past_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _log) = setup_test(dir.path()).await;

        let offset = client
            .produce(produce_request("hello world"))
            .await
            .unwrap()
            .into_inner()
            .offset;

        let status = client
            .consume(ConsumeRequest { offset: offset + 1 })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::OutOfRange);
    }

    #[tokio::test]
    async fn test_produce_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _log) = setup_test(dir.path()).await;

        let status = client
            .produce(ProduceRequest { record: None })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_produce_consume_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _log) = setup_test(dir.path()).await;

        let requests = vec![produce_request("first message"), produce_request("second message")];
        let mut produced = client
            .produce_stream(tokio_stream::iter(requests))
            .await
            .unwrap()
            .into_inner();
        for want in 0..2u64 {
            let res = produced.message().await.unwrap().unwrap();
            assert_eq!(res.offset, want);
        }
        assert!(produced.message().await.unwrap().is_none());

        let mut consumed = client
            .consume_stream(ConsumeRequest { offset: 0 })
            .await
            .unwrap()
            .into_inner();
        for (offset, want) in ["first message", "second message"].iter().enumerate() {
            let record = consumed.message().await.unwrap().unwrap().record.unwrap();
            assert_eq!(record.value, want.as_bytes().to_vec());
            assert_eq!(record.offset, offset as u64);
        }

        // The stream waits for records that are not written yet
        let mut producer = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            producer.produce(produce_request("third message")).await.unwrap();
        });
        let record = tokio::time::timeout(Duration::from_secs(5), consumed.message())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .record
            .unwrap();
        assert_eq!(record.value, b"third message".to_vec());
        assert_eq!(record.offset, 2);
    }

    #[tokio::test]
    async fn test_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _log) = setup_test(dir.path()).await;

        for value in ["a", "bc", "def"] {
            client.produce(produce_request(value)).await.unwrap();
        }
        client.consume(ConsumeRequest { offset: 1 }).await.unwrap();

        let metrics = client
            .metrics(MetricsRequest {})
            .await
            .unwrap()
            .into_inner()
            .metrics
            .unwrap();
        assert_eq!(metrics.records_produced, 3);
        assert_eq!(metrics.records_consumed, 1);
        assert_eq!(metrics.bytes_produced, 6);
        assert_eq!(metrics.lowest_offset, 0);
        assert_eq!(metrics.highest_offset, 2);
    }

    #[tokio::test]
    async fn test_shutdown_signal_failure_resolves() {
        let failed = async {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "signal handler unavailable",
            ))
        };
        tokio::time::timeout(Duration::from_secs(1), shutdown_signal(failed))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), shutdown_signal(async { Ok(()) }))
            .await
            .unwrap();
    }
}

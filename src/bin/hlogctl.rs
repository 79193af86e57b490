use clap::{Parser, Subcommand};
use tonic::transport::Channel;

use homelog::api::v1::log_client::LogClient;
use homelog::api::{ConsumeRequest, Metrics, MetricsRequest, ProduceRequest, Record};

/// Default port of the homelog server
const DEFAULT_PORT: u16 = 20101;

pub struct HomeLogClient {}

impl HomeLogClient {
    pub async fn produce(
        &self,
        conn: &mut LogClient<Channel>,
        values: Vec<String>,
    ) -> Result<Vec<u64>, Box<dyn std::error::Error>> {
        let mut requests: Vec<ProduceRequest> = values
            .into_iter()
            .map(|value| ProduceRequest {
                record: Some(Record::new(value)),
            })
            .collect();

        println!("Sending request to gRPC Server...");
        if requests.len() == 1 {
            let request = tonic::Request::new(requests.remove(0));
            let response = conn.produce(request).await?;
            return Ok(vec![response.into_inner().offset]);
        }

        // Several values share one bidirectional stream
        let mut responses = conn
            .produce_stream(tokio_stream::iter(requests))
            .await?
            .into_inner();
        let mut offsets = Vec::new();
        while let Some(response) = responses.message().await? {
            offsets.push(response.offset);
        }
        Ok(offsets)
    }

    pub async fn consume(
        &self,
        conn: &mut LogClient<Channel>,
        offset: u64,
    ) -> Result<Option<Record>, Box<dyn std::error::Error>> {
        let request = tonic::Request::new(ConsumeRequest { offset });

        println!("Sending request to gRPC Server...");
        let response = conn.consume(request).await?;
        Ok(response.into_inner().record)
    }

    /// Prints records from `offset` on, waiting for new ones, until the
    /// server closes the stream or the process is interrupted.
    pub async fn tail(
        &self,
        conn: &mut LogClient<Channel>,
        offset: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let request = tonic::Request::new(ConsumeRequest { offset });

        println!("Sending request to gRPC Server...");
        let mut stream = conn.consume_stream(request).await?.into_inner();
        while let Some(response) = stream.message().await? {
            if let Some(record) = response.record {
                print_record(&record);
            }
        }
        Ok(())
    }

    pub async fn metrics(
        &self,
        conn: &mut LogClient<Channel>,
    ) -> Result<Option<Metrics>, Box<dyn std::error::Error>> {
        let request = tonic::Request::new(MetricsRequest {});

        println!("Sending request to gRPC Server...");
        let response = conn.metrics(request).await?;
        Ok(response.into_inner().metrics)
    }
}

fn print_record(record: &Record) {
    println!(
        "offset={}, value={}",
        record.offset,
        String::from_utf8_lossy(&record.value)
    );
}

#[derive(Subcommand)]
enum Cmd {
    /// Append one or more values to the log
    Produce { values: Vec<String> },
    /// Read the record at an offset
    Consume { offset: u64 },
    /// Follow the log from an offset
    Tail {
        #[clap(default_value_t = 0)]
        offset: u64,
    },
    Metrics,
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Server Host
    #[clap(short = 'H', long, default_value_t = String::from("127.0.0.1"))]
    host: String,

    /// Server Port
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Command: produce, consume, tail, metrics
    #[command(subcommand)]
    cmd: Cmd,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut conn = LogClient::connect(format!("http://{}:{}", args.host, args.port)).await?;

    let client = HomeLogClient {};

    match args.cmd {
        Cmd::Produce { values } => {
            if values.is_empty() {
                return Err("produce command must have at least one value".into());
            }
            match client.produce(&mut conn, values).await {
                Ok(offsets) => println!("Produced at offsets: {:?}", offsets),
                Err(e) => println!("Produce runs in error: {:?}", e),
            }
        }
        Cmd::Consume { offset } => match client.consume(&mut conn, offset).await {
            Ok(Some(record)) => print_record(&record),
            Ok(None) => println!("offset={}, value=None", offset),
            Err(e) => println!("Consume runs in error: {:?}", e),
        },
        Cmd::Tail { offset } => {
            if let Err(e) = client.tail(&mut conn, offset).await {
                println!("Tail runs in error: {:?}", e);
            }
        }
        Cmd::Metrics => match client.metrics(&mut conn).await {
            Ok(metrics) => println!("Metrics: {:?}", metrics),
            Err(e) => println!("Metrics runs in error: {:?}", e),
        },
    }
    Ok(())
}

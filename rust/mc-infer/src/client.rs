//! `RemoteValueNet`: blocking client for the v1 batch-prediction protocol.
//!
//! One request is in flight at a time. The scheduler issues exactly one forward pass per
//! lockstep round, so there is nothing to pipeline.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::codec::{decode_response_v1, encode_request_v1, DecodeError};
use crate::frame::{read_frame, write_frame, FrameError};
use crate::protocol::{PredictRequestV1, FEATURE_SCHEMA_ID_V1};
use crate::tensor::{Device, ObservationBatch, QValues};
use crate::{InferError, ValueNetwork};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("unsupported endpoint {0:?} (expected tcp://host:port or unix:///path)")]
    BadEndpoint(String),
    #[error("response id {got} does not match request {expected}")]
    IdMismatch { got: u64, expected: u64 },
    #[error("response dims ({got_b}, {got_n}) do not match request ({want_b}, {want_n})")]
    DimsMismatch {
        got_b: u32,
        got_n: u32,
        want_b: u32,
        want_n: u32,
    },
    #[error("batch dimension does not fit the wire format")]
    TooLarge,
    #[error("connection lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    Uds(UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Uds(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Uds(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Uds(s) => s.flush(),
        }
    }
}

impl Stream {
    fn shutdown(&self) {
        match self {
            Stream::Tcp(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            Stream::Uds(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
        }
    }
}

/// Value network served by an external process.
#[derive(Debug)]
pub struct RemoteValueNet {
    endpoint: String,
    model_id: u32,
    device: Device,
    next_request_id: AtomicU64,
    stream: Mutex<Stream>,
}

impl RemoteValueNet {
    /// Connect to `tcp://host:port` or `unix:///path`.
    pub fn connect(endpoint: &str, model_id: u32) -> Result<Self, ClientError> {
        let stream = if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let s = TcpStream::connect(addr)?;
            s.set_nodelay(true).ok();
            Stream::Tcp(s)
        } else if let Some(path) = endpoint.strip_prefix("unix://") {
            Stream::Uds(UnixStream::connect(path)?)
        } else {
            return Err(ClientError::BadEndpoint(endpoint.to_string()));
        };
        Ok(Self {
            endpoint: endpoint.to_string(),
            model_id,
            device: Device::Cpu,
            next_request_id: AtomicU64::new(1),
            stream: Mutex::new(stream),
        })
    }

    /// Device the server expects batches on. Only used for tagging.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn round_trip(&self, batch: &ObservationBatch) -> Result<Vec<f32>, ClientError> {
        let (b, n, f) = batch.shape();
        let dim = |x: usize| u32::try_from(x).map_err(|_| ClientError::TooLarge);
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let req = PredictRequestV1 {
            request_id,
            model_id: self.model_id,
            feature_schema_id: FEATURE_SCHEMA_ID_V1,
            batch: dim(b)?,
            n_vertices: dim(n)?,
            n_features: dim(f)?,
            observations: batch.as_slice().to_vec(),
        };
        let payload = encode_request_v1(&req);

        let mut stream = self.stream.lock().map_err(|_| ClientError::Poisoned)?;
        write_frame(&mut *stream, &payload)?;
        let resp = decode_response_v1(&read_frame(&mut *stream)?)?;
        drop(stream);

        if resp.request_id != request_id {
            return Err(ClientError::IdMismatch {
                got: resp.request_id,
                expected: request_id,
            });
        }
        if resp.batch != req.batch || resp.n_vertices != req.n_vertices {
            return Err(ClientError::DimsMismatch {
                got_b: resp.batch,
                got_n: resp.n_vertices,
                want_b: req.batch,
                want_n: req.n_vertices,
            });
        }
        Ok(resp.q_values)
    }
}

impl ValueNetwork for RemoteValueNet {
    fn predict(&self, batch: &ObservationBatch) -> Result<QValues, InferError> {
        let q = self.round_trip(batch)?;
        QValues::new(batch.batch(), batch.n_vertices(), q, batch.device())
    }

    fn device(&self) -> Device {
        self.device
    }

    fn describe(&self) -> String {
        format!("remote model {} at {}", self.model_id, self.endpoint)
    }
}

impl Drop for RemoteValueNet {
    fn drop(&mut self) {
        if let Ok(s) = self.stream.get_mut() {
            s.shutdown();
        }
    }
}

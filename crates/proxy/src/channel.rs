use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use environment::EnvError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// One side of a duplex channel carrying JSON messages, one per line.
///
/// The channel is closed once the peer goes away: for stream backed
/// endpoints that is EOF or a failed write.
pub struct Endpoint {
    tx: Sender<String>,
    rx: Receiver<String>,
    writer: Option<JoinHandle<()>>,
}

impl Endpoint {
    /// Two connected in-process endpoints.
    #[must_use]
    pub fn pair() -> (Endpoint, Endpoint) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            Endpoint { tx: a_tx, rx: a_rx, writer: None },
            Endpoint { tx: b_tx, rx: b_rx, writer: None },
        )
    }

    /// Wraps a byte stream pair, e.g. the stdio of a child process.
    ///
    /// Two pump threads move lines between the streams and the endpoint.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Result<Endpoint, EnvError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (in_tx, in_rx) = unbounded::<String>();
        let (out_tx, out_rx) = unbounded::<String>();

        thread::Builder::new()
            .name("proxy-reader".into())
            .spawn(move || {
                for line in BufReader::new(reader).lines() {
                    match line {
                        Ok(line) if line.trim().is_empty() => {}
                        Ok(line) => {
                            if in_tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Reading from the channel failed: {e}");
                            break;
                        }
                    }
                }
                debug!("Channel reader finished");
            })
            .map_err(|e| EnvError::Channel(e.to_string()))?;

        let writer = thread::Builder::new()
            .name("proxy-writer".into())
            .spawn(move || {
                let mut writer = writer;
                for line in out_rx {
                    let written = writeln!(writer, "{line}").and_then(|()| writer.flush());
                    if let Err(e) = written {
                        warn!("Writing to the channel failed: {e}");
                        break;
                    }
                }
                debug!("Channel writer finished");
            })
            .map_err(|e| EnvError::Channel(e.to_string()))?;

        Ok(Endpoint { tx: out_tx, rx: in_rx, writer: Some(writer) })
    }

    /// Closes the sending side and waits until every queued line has been
    /// written to the stream.
    pub fn shutdown(self) -> Result<(), EnvError> {
        let Endpoint { tx, rx: _, writer } = self;
        drop(tx);
        match writer {
            Some(writer) => writer
                .join()
                .map_err(|_| EnvError::Channel("channel writer panicked".into())),
            None => Ok(()),
        }
    }

    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), EnvError> {
        let line = serde_json::to_string(message).map_err(|e| EnvError::Channel(e.to_string()))?;
        self.tx.send(line).map_err(|_| EnvError::Channel("channel is closed".into()))
    }

    /// Blocks until the next line arrives.
    pub fn recv_line(&self) -> Result<String, EnvError> {
        self.rx.recv().map_err(|_| EnvError::Channel("channel is closed".into()))
    }

    pub fn recv_line_timeout(&self, timeout: Duration) -> Result<String, EnvError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => EnvError::Timeout(timeout),
            RecvTimeoutError::Disconnected => EnvError::Channel("channel is closed".into()),
        })
    }

    pub fn recv<T: DeserializeOwned>(&self) -> Result<T, EnvError> {
        decode(&self.recv_line()?)
    }

    pub fn recv_timeout<T: DeserializeOwned>(&self, timeout: Duration) -> Result<T, EnvError> {
        decode(&self.recv_line_timeout(timeout)?)
    }
}

fn decode<T: DeserializeOwned>(line: &str) -> Result<T, EnvError> {
    serde_json::from_str(line).map_err(|e| EnvError::Channel(format!("malformed message: {e}")))
}

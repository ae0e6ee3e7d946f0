//! Background keep-alive
//!
//! The NXT powers itself down after its sleep limit unless it sees a
//! KeepAlive. `KeepAlive::spawn` sends one on a fixed interval to a
//! shared brick until stopped or dropped.

use crate::domain::error::NxtError;
use crate::infrastructure::bluetooth::brick::Brick;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct KeepAlive {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<u64>>,
}

impl KeepAlive {
    pub fn spawn<S>(brick: Arc<Mutex<Brick<S>>>, interval: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);
        info!("Sending keep-alive every {:?}", interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut sent = 0u64;

            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        match brick.lock().await.stay_alive().await {
                            Ok(limit) => {
                                sent += 1;
                                debug!("Keep-alive acknowledged, sleep limit {} ms", limit);
                            }
                            Err(NxtError::Closed) => {
                                debug!("Brick closed, stopping keep-alive");
                                break;
                            }
                            Err(e) => warn!("Keep-alive failed: {}", e),
                        }
                    }
                }
            }
            sent
        });

        Self {
            stop,
            task: Some(task),
        }
    }

    /// Stop sending and return how many keep-alives were acknowledged
    pub async fn stop(mut self) -> u64 {
        let _ = self.stop.send(true);
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

//! Waiting for the host to reflow after a layout mutation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::surface::Surface;

/// How to wait for a mutated layout to be painted before measuring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleStrategy {
    /// Await the host's next frame, bounded by the fallback delay. Hosts
    /// without a frame signal fall back to the delay.
    #[default]
    NextFrame,
    /// Always sleep for the fallback delay.
    FixedDelay,
}

/// How the layout was considered settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Frame,
    Delay,
}

pub async fn settle<S: Surface>(surface: &S, strategy: SettleStrategy, fallback: Duration) -> Settled {
    if strategy == SettleStrategy::NextFrame {
        match tokio::time::timeout(fallback, surface.next_frame()).await {
            Ok(true) => return Settled::Frame,
            Ok(false) => {
                log::debug!("host has no frame signal, waiting {:?}", fallback);
                tokio::time::sleep(fallback).await;
            }
            Err(_) => log::warn!("no frame within {:?}, measuring anyway", fallback),
        }
        return Settled::Delay;
    }
    tokio::time::sleep(fallback).await;
    Settled::Delay
}

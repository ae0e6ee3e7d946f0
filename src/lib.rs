//! Bluetooth control for the LEGO NXT.
//!
//! ```no_run
//! # async fn demo() -> nxt_control::Result<()> {
//! use nxt_control::{Brick, BrickAddress, MotorPort, Power};
//! use nxt_control::domain::settings::BrickSettings;
//!
//! let address: BrickAddress = "00:16:53:0A:BC:DE".parse()?;
//! let mut nxt = Brick::connect(address, &BrickSettings::default()).await?;
//! nxt.play_tone(440, 250).await?;
//! nxt.set_motor(MotorPort::B, Power::new(60)?).await?;
//! nxt.stop_all_motors().await?;
//! nxt.close().await;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::error::{NxtError, Result};
pub use domain::models::{BrickAddress, DriveDirection, MotorPort, Power, SensorPort};
pub use infrastructure::bluetooth::{Brick, ConnectionConfig, KeepAlive};

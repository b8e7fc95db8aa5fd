//! `Delay` node: a fixed or uniformly random pause.

use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::config::ConfigReader;
use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Config:
/// - `{ "delayType": "Fixed", "time": ms }`
/// - `{ "delayType": "Random", "minTime": ms, "maxTime": ms }`
#[derive(Debug, Default)]
pub struct DelayNode;

impl DelayNode {
    fn duration(config: &ConfigReader<'_>) -> Result<Duration, NodeError> {
        match config.str("delayType")? {
            "Fixed" => Ok(Duration::from_millis(config.millis("time")?)),
            "Random" => {
                let min = config.millis("minTime")?;
                let max = config.millis("maxTime")?;
                if min > max {
                    return Err(NodeError::InvalidRange {
                        min: min as f64,
                        max: max as f64,
                    });
                }
                let picked = rand::thread_rng().gen_range(min..=max);
                Ok(Duration::from_millis(picked))
            }
            other => Err(NodeError::config(
                "delayType",
                format!("has unsupported value '{other}'"),
            )),
        }
    }
}

impl ExecutableNode for DelayNode {
    fn execute(&self, config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        let duration = Self::duration(&ConfigReader::new(config)?)?;
        debug!(task_id = ctx.task_id, ?duration, "delaying");
        ctx.driver.sleep(duration);
        Ok(())
    }
}

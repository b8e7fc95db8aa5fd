//! `MoveMouse` node: pointer travel between two positions, optionally
//! dragging with the left button held.

use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ConfigReader;
use crate::{ExecutableNode, ExecutionContext, MouseButton, NodeError, Point};

/// Randomness band of a straight smooth move.
const STRAIGHT_JITTER: (f64, f64) = (1.0, 1.2);
/// Randomness band of a human-like smooth move.
const HUMAN_JITTER: (f64, f64) = (1.0, 2.0);

/// Config:
///
/// ```json
/// {
///   "startPosition": { "type": "Mouse" },
///   "endPosition": { "type": "Coordinate", "coordinates": { "x": 100, "y": 200 } },
///   "speed": { "type": "Smooth", "value": 10, "randomize": true, "variance": 20 },
///   "pathType": "Straight",
///   "dragWhileMoving": false
/// }
/// ```
///
/// A `"Mouse"` position resolves to the pointer location observed before
/// the node moved anything.
#[derive(Debug, Default)]
pub struct MoveMouseNode;

#[derive(Debug)]
struct MovePlan {
    start: Point,
    end: Point,
    instant: bool,
    delay_ms: u64,
    jitter: (f64, f64),
    drag: bool,
}

fn resolve_position(config: &ConfigReader<'_>, field: &str, current: Point) -> Result<Point, NodeError> {
    let position = config.object(field)?;
    if position.opt_str("type")? == Some("Mouse") {
        return Ok(current);
    }
    let coords = position.object("coordinates")?;
    Ok(Point::new(coords.f64("x")? as i32, coords.f64("y")? as i32))
}

/// `value ± value * variance%`, sampled uniformly; never negative.
fn effective_speed(speed: &ConfigReader<'_>) -> Result<f64, NodeError> {
    let value = speed.f64("value")?;
    if !speed.opt_bool("randomize")?.unwrap_or(false) {
        return Ok(value.max(0.0));
    }
    let variance = speed.opt_f64("variance")?.unwrap_or(0.0).abs();
    let spread = value * variance / 100.0;
    let offset = if spread > 0.0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0.0
    };
    Ok((value + offset).max(0.0))
}

impl MovePlan {
    fn parse(config: &ConfigReader<'_>, current: Point) -> Result<Self, NodeError> {
        let start = resolve_position(config, "startPosition", current)?;
        let end = resolve_position(config, "endPosition", current)?;

        let speed = config.object("speed")?;
        let instant = speed.str("type")? == "Instant";
        let delay_ms = effective_speed(&speed)? as u64;

        let jitter = match config.str("pathType")? {
            "Straight" => STRAIGHT_JITTER,
            _ => HUMAN_JITTER,
        };

        Ok(Self {
            start,
            end,
            instant,
            delay_ms,
            jitter,
            drag: config.bool("dragWhileMoving")?,
        })
    }
}

impl MoveMouseNode {
    fn travel(plan: &MovePlan, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        if plan.instant {
            ctx.driver.move_pointer(plan.end)?;
            return Ok(());
        }
        if !ctx.driver.move_pointer_smooth(plan.end, plan.jitter, plan.delay_ms) {
            warn!(task_id = ctx.task_id, "smooth move failed, falling back to instant move");
            ctx.driver.move_pointer(plan.end)?;
        }
        Ok(())
    }
}

impl ExecutableNode for MoveMouseNode {
    fn execute(&self, config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        let current = ctx.driver.pointer_location();
        let plan = MovePlan::parse(&ConfigReader::new(config)?, current)?;
        debug!(task_id = ctx.task_id, ?plan, "moving pointer");

        ctx.driver.move_pointer(plan.start)?;

        if plan.drag {
            ctx.driver.press_button(MouseButton::Left)?;
        }

        let travelled = Self::travel(&plan, ctx);

        // The button is released even when the move itself failed.
        if plan.drag {
            ctx.driver.release_button(MouseButton::Left)?;
        }

        travelled
    }
}

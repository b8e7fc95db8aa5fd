//! `Click` node: N presses of a mouse button followed by optional scroll
//! passes.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::SETTLE;
use crate::config::ConfigReader;
use crate::{ExecutableNode, ExecutionContext, MouseButton, NodeError, ScrollAxis};

const DEFAULT_CLICK_DELAY_MS: u64 = 100;
const DEFAULT_PRESS_RELEASE_DELAY_MS: u64 = 100;

/// Config fields:
///
/// | field | type | default |
/// |---|---|---|
/// | `buttonType` | `"left" \| "right" \| "middle"` | required |
/// | `numberOfClicks` | number | required |
/// | `clickDelay` | ms between clicks | 100 |
/// | `pressReleaseDelay` | ms the button is held | 100 |
/// | `releaseAfterPress` | explicit press/hold/release instead of a click | false |
/// | `scrollDirection` | list of `"Vertical"` / `"Horizontal"` | none |
/// | `scrollLines` | number | none |
#[derive(Debug, Default)]
pub struct ClickNode;

#[derive(Debug)]
struct ClickPlan {
    button: MouseButton,
    clicks: u32,
    click_delay: Duration,
    press_duration: Duration,
    release_after_press: bool,
    scrolls: Vec<ScrollAxis>,
    scroll_lines: i32,
}

impl ClickPlan {
    fn parse(config: &ConfigReader<'_>) -> Result<Self, NodeError> {
        let button = config
            .str("buttonType")?
            .parse::<MouseButton>()
            .map_err(|reason| NodeError::config("buttonType", reason))?;

        let clicks = config.f64("numberOfClicks")?;
        if clicks < 0.0 || !clicks.is_finite() {
            return Err(NodeError::config("numberOfClicks", "must be a non-negative number"));
        }

        let scroll_lines = config.opt_f64("scrollLines")?.unwrap_or(0.0) as i32;
        let scrolls = if scroll_lines > 0 {
            config
                .opt_str_list("scrollDirection")?
                .into_iter()
                .filter_map(|dir| match dir {
                    "Vertical" => Some(ScrollAxis::Vertical),
                    "Horizontal" => Some(ScrollAxis::Horizontal),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            button,
            clicks: clicks as u32,
            click_delay: Duration::from_millis(config.opt_millis("clickDelay", DEFAULT_CLICK_DELAY_MS)?),
            press_duration: Duration::from_millis(
                config.opt_millis("pressReleaseDelay", DEFAULT_PRESS_RELEASE_DELAY_MS)?,
            ),
            release_after_press: config.opt_bool("releaseAfterPress")?.unwrap_or(false),
            scrolls,
            scroll_lines,
        })
    }
}

impl ExecutableNode for ClickNode {
    fn execute(&self, config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        let plan = ClickPlan::parse(&ConfigReader::new(config)?)?;
        let driver = ctx.driver;

        debug!(
            task_id = ctx.task_id,
            button = %plan.button,
            clicks = plan.clicks,
            "performing {} clicks with {:?} delay and {:?} press duration",
            plan.clicks, plan.click_delay, plan.press_duration
        );

        for i in 0..plan.clicks {
            if plan.release_after_press {
                driver.press_button(plan.button)?;
                driver.sleep(plan.press_duration);
                driver.release_button(plan.button)?;
            } else {
                driver.click(plan.button)?;
            }

            if i + 1 < plan.clicks {
                driver.sleep(plan.click_delay);
            }
        }

        for axis in &plan.scrolls {
            debug!(task_id = ctx.task_id, ?axis, lines = plan.scroll_lines, "scrolling");
            driver.scroll(plan.scroll_lines, *axis)?;
            driver.sleep(SETTLE);
        }

        Ok(())
    }
}

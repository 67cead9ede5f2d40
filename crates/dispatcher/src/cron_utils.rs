use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tracing::debug;

use orchestrator_core::{OrchestratorError, OrchestratorResult};

/// 向前回溯查找上一次触发时间时依次尝试的窗口（秒）
const LOOKBACK_WINDOWS: [i64; 5] = [
    3_600,
    86_400,
    32 * 86_400,
    366 * 86_400,
    (4 * 366 + 1) * 86_400,
];

/// CRON表达式解析和调度工具
///
/// 同时接受标准五字段（分 时 日 月 周，周日为0）和 `cron` crate 的
/// 六/七字段（秒在最前，周日为1）写法。五字段表达式会被规范化为六字段。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> OrchestratorResult<Self> {
        let expression = Self::normalize(cron_expr)?;
        let schedule = Schedule::from_str(&expression).map_err(|e| OrchestratorError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression,
            schedule,
        })
    }

    /// 规范化后的六/七字段表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 把五字段表达式转换为以秒开头的六字段表达式
    pub fn normalize(cron_expr: &str) -> OrchestratorResult<String> {
        let fields: Vec<&str> = cron_expr.split_whitespace().collect();
        match fields.len() {
            5 => {
                let dow = Self::translate_day_of_week(cron_expr, fields[4])?;
                Ok(format!(
                    "0 {} {} {} {} {}",
                    fields[0], fields[1], fields[2], fields[3], dow
                ))
            }
            6 | 7 => Ok(fields.join(" ")),
            n => Err(OrchestratorError::InvalidCron {
                expr: cron_expr.to_string(),
                message: format!("期望5、6或7个字段，实际为{n}个"),
            }),
        }
    }

    /// 五字段写法中周字段的数字为 0-7（0和7都表示周日），换算为 1-7
    fn translate_day_of_week(cron_expr: &str, field: &str) -> OrchestratorResult<String> {
        let invalid = |message: String| OrchestratorError::InvalidCron {
            expr: cron_expr.to_string(),
            message,
        };
        let parse_day = |s: &str| -> OrchestratorResult<u32> {
            match s.parse::<u32>() {
                Ok(d) if d <= 7 => Ok(d),
                Ok(d) => Err(invalid(format!("星期取值超出范围: {d}"))),
                Err(_) => Err(invalid(format!("无法解析星期字段: {s}"))),
            }
        };
        let shift = |d: u32| (d % 7) + 1;

        let mut parts = Vec::new();
        for item in field.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };

            // `*`、`?` 以及英文缩写与 cron crate 的含义一致，原样保留
            if range == "*" || range == "?" || range.chars().any(|c| c.is_ascii_alphabetic()) {
                parts.push(item.to_string());
                continue;
            }

            let (start, end) = match range.split_once('-') {
                Some((a, b)) => (parse_day(a)?, parse_day(b)?),
                None if step.is_some() => (parse_day(range)?, 6),
                None => {
                    parts.push(shift(parse_day(range)?).to_string());
                    continue;
                }
            };
            let step = match step {
                Some(s) => s
                    .parse::<usize>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| invalid(format!("无效的步长: {s}")))?,
                None => 1,
            };
            if start > end {
                return Err(invalid(format!("无效的星期范围: {range}")));
            }
            parts.extend((start..=end).step_by(step).map(|d| shift(d).to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        parts.retain(|p| seen.insert(p.clone()));
        Ok(parts.join(","))
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> OrchestratorResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    pub fn is_valid(cron_expr: &str) -> bool {
        Self::validate_cron_expression(cron_expr).is_ok()
    }

    /// 不晚于 `now` 的最近一次触发时间
    ///
    /// 依次扩大回溯窗口，超过四年仍找不到触发点时返回 `None`。
    pub fn previous_fire_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        for seconds in LOOKBACK_WINDOWS {
            let from = now - Duration::seconds(seconds);
            let previous = self
                .schedule
                .after(&from)
                .take_while(|t| *t <= now)
                .last();
            if previous.is_some() {
                return previous;
            }
        }
        debug!("表达式 {} 在回溯窗口内没有触发时间", self.expression);
        None
    }

    /// 获取下一次执行时间（严格晚于 `from`）
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn next_fire_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 判断本窗口是否到期：最近一次触发距今不足一个轮询周期
    ///
    /// 返回到期的触发时间，即窗口起点。
    pub fn due_fire_time(
        &self,
        now: DateTime<Utc>,
        poll_interval: Duration,
    ) -> Option<DateTime<Utc>> {
        self.previous_fire_time(now)
            .filter(|fire_time| now - *fire_time < poll_interval)
    }
}

/// 校验表达式是否可解析
pub fn is_valid(expr: &str) -> bool {
    CronScheduler::is_valid(expr)
}

/// 不晚于 `now` 的最近一次触发时间
pub fn previous_fire_time(expr: &str, now: DateTime<Utc>) -> OrchestratorResult<Option<DateTime<Utc>>> {
    Ok(CronScheduler::new(expr)?.previous_fire_time(now))
}

/// 严格晚于 `now` 的后续 `count` 次触发时间
pub fn next_fire_times(
    expr: &str,
    now: DateTime<Utc>,
    count: usize,
) -> OrchestratorResult<Vec<DateTime<Utc>>> {
    Ok(CronScheduler::new(expr)?.next_fire_times(now, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_five_fields() {
        assert_eq!(CronScheduler::normalize("0 2 * * *").unwrap(), "0 0 2 * * *");
        assert_eq!(
            CronScheduler::normalize("0 0 2 * * *").unwrap(),
            "0 0 2 * * *"
        );
        assert!(CronScheduler::normalize("* * *").is_err());
    }

    #[test]
    fn test_day_of_week_translation() {
        // 周一到周五
        assert_eq!(
            CronScheduler::normalize("30 1 * * 1-5").unwrap(),
            "0 30 1 * * 2,3,4,5,6"
        );
        // 周日可以写成0或7
        assert_eq!(CronScheduler::normalize("0 3 * * 0").unwrap(), "0 0 3 * * 1");
        assert_eq!(CronScheduler::normalize("0 3 * * 7").unwrap(), "0 0 3 * * 1");
        assert_eq!(CronScheduler::normalize("0 3 * * 6,0").unwrap(), "0 0 3 * * 7,1");
        assert_eq!(CronScheduler::normalize("0 3 * * MON").unwrap(), "0 0 3 * * MON");
        assert!(CronScheduler::normalize("0 3 * * 9").is_err());
    }
}

//! GFS（祖父-父-子）保留轮换引擎
//!
//! 纯函数：输入按创建时间倒序排列的未删除产物快照和一个保留策略，输出保留集合
//! 与删除集合。持久化由 [`crate::rotation_service::RotationService`] 负责。
//!
//! 五个层级分别按 `(日期, 小时)`、`日期`、`(ISO年, ISO周)`、`(年, 月)`、`年`
//! 分桶。每个层级取最近的 `keep_<层级>` 个桶，每个桶只保留其中最新的一份产物；
//! 保留集合是各层级结果的并集。

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use orchestrator_core::models::{
    BackupArtifact, MaxAgeMode, RetentionPolicy, RotationCandidate, RotationPlan, RotationReason,
};

/// 每个层级：桶键 -> 桶内最新产物的ID
#[derive(Debug, Default)]
struct TierBuckets {
    hourly: BTreeMap<(NaiveDate, u32), i64>,
    daily: BTreeMap<NaiveDate, i64>,
    weekly: BTreeMap<(i32, u32), i64>,
    monthly: BTreeMap<(i32, u32), i64>,
    yearly: BTreeMap<i32, i64>,
}

impl TierBuckets {
    /// 输入按创建时间倒序，首个进入桶的产物就是桶内最新的
    fn partition(artifacts: &[BackupArtifact]) -> Self {
        let mut buckets = Self::default();
        for artifact in artifacts {
            let ts = artifact.created_at;
            let date = ts.date_naive();
            let iso = ts.iso_week();

            buckets.hourly.entry((date, ts.hour())).or_insert(artifact.id);
            buckets.daily.entry(date).or_insert(artifact.id);
            buckets
                .weekly
                .entry((iso.year(), iso.week()))
                .or_insert(artifact.id);
            buckets
                .monthly
                .entry((ts.year(), ts.month()))
                .or_insert(artifact.id);
            buckets.yearly.entry(ts.year()).or_insert(artifact.id);
        }
        buckets
    }

    fn keep_set(&self, policy: &RetentionPolicy) -> BTreeSet<i64> {
        let mut keep = BTreeSet::new();
        keep.extend(newest_buckets(&self.hourly, policy.keep_hourly));
        keep.extend(newest_buckets(&self.daily, policy.keep_daily));
        keep.extend(newest_buckets(&self.weekly, policy.keep_weekly));
        keep.extend(newest_buckets(&self.monthly, policy.keep_monthly));
        keep.extend(newest_buckets(&self.yearly, policy.keep_yearly));
        keep
    }
}

/// 按键倒序取最近的 `keep` 个桶的代表产物
fn newest_buckets<K: Ord>(buckets: &BTreeMap<K, i64>, keep: u32) -> impl Iterator<Item = i64> + '_ {
    buckets.values().rev().take(keep as usize).copied()
}

/// 年龄上限的截止时间，`max_age_days == 0` 表示不限
pub fn age_cutoff(policy: &RetentionPolicy, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (policy.max_age_days > 0).then(|| now - Duration::days(i64::from(policy.max_age_days)))
}

/// 计算一个快照的轮换计划
///
/// `artifacts` 必须是同一作用域内未删除的产物，按 `created_at` 倒序排列。
pub fn plan_rotation(
    artifacts: &[BackupArtifact],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    mode: MaxAgeMode,
) -> RotationPlan {
    let keep_ids = TierBuckets::partition(artifacts).keep_set(policy);
    let cutoff = age_cutoff(policy, now);

    let to_delete = artifacts
        .iter()
        .filter_map(|artifact| {
            let expired = cutoff.is_some_and(|c| artifact.created_at < c);
            let kept = keep_ids.contains(&artifact.id);
            let delete = match mode {
                MaxAgeMode::KeepSetWins => !kept,
                MaxAgeMode::HardCeiling => !kept || expired,
            };
            delete.then(|| RotationCandidate {
                id: artifact.id,
                filename: artifact.filename.clone(),
                created_at: artifact.created_at,
                size_bytes: artifact.size_bytes,
                reason: if expired {
                    RotationReason::MaxAge
                } else {
                    RotationReason::Rotation
                },
            })
        })
        .collect::<Vec<_>>();

    // 硬上限模式下过期的产物即使被某个层级选中也不算保留
    let keep_ids = match mode {
        MaxAgeMode::KeepSetWins => keep_ids,
        MaxAgeMode::HardCeiling => {
            let deleted: BTreeSet<i64> = to_delete.iter().map(|c| c.id).collect();
            keep_ids.difference(&deleted).copied().collect()
        }
    };

    RotationPlan {
        total: artifacts.len(),
        keep_ids,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn artifact(id: i64, created_at: DateTime<Utc>) -> BackupArtifact {
        BackupArtifact {
            id,
            run_id: id,
            job_id: 1,
            destination_id: 1,
            filename: format!("backup-{id}.tar.gz"),
            remote_path: format!("/backups/backup-{id}.tar.gz"),
            size_bytes: 100,
            checksum_sha256: String::new(),
            is_encrypted: false,
            backup_type: "files".to_string(),
            tags: Vec::new(),
            domain: None,
            db_name: None,
            server_name: None,
            expires_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at,
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let policy = RetentionPolicy::new("p");
        let plan = plan_rotation(&[], &policy, Utc::now(), MaxAgeMode::KeepSetWins);
        assert_eq!(plan.total, 0);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_newest_in_bucket_wins() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 30, 0).unwrap();
        // 同一小时内的两份，只保留较新的
        let artifacts = vec![
            artifact(2, now - Duration::minutes(5)),
            artifact(1, now - Duration::minutes(20)),
        ];
        let mut policy = RetentionPolicy::new("p");
        policy.keep_hourly = 5;

        let plan = plan_rotation(&artifacts, &policy, now, MaxAgeMode::KeepSetWins);
        assert_eq!(plan.keep_ids, BTreeSet::from([2]));
        assert_eq!(plan.delete_ids(), vec![1]);
    }

    #[test]
    fn test_weekly_uses_iso_week() {
        // 2024-12-30 属于 2025 年第1周，与 2025-01-02 同桶
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 8, 0, 0).unwrap();
        let artifacts = vec![
            artifact(3, now),
            artifact(2, Utc.with_ymd_and_hms(2024, 12, 30, 8, 0, 0).unwrap()),
            artifact(1, Utc.with_ymd_and_hms(2024, 12, 29, 8, 0, 0).unwrap()),
        ];
        let mut policy = RetentionPolicy::new("p");
        policy.keep_weekly = 2;

        let plan = plan_rotation(&artifacts, &policy, now, MaxAgeMode::KeepSetWins);
        assert_eq!(plan.keep_ids, BTreeSet::from([1, 3]));
        assert_eq!(plan.delete_ids(), vec![2]);
    }

    #[test]
    fn test_hard_ceiling_removes_expired_keepers() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        let artifacts = vec![artifact(2, now), artifact(1, now - Duration::days(40))];
        let mut policy = RetentionPolicy::new("p");
        policy.keep_monthly = 2;
        policy.max_age_days = 30;

        let plan = plan_rotation(&artifacts, &policy, now, MaxAgeMode::HardCeiling);
        assert_eq!(plan.keep_ids, BTreeSet::from([2]));
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].reason, RotationReason::MaxAge);
    }

    #[test]
    fn test_age_cutoff() {
        let now = Utc::now();
        let mut policy = RetentionPolicy::new("p");
        assert_eq!(age_cutoff(&policy, now), None);
        policy.max_age_days = 7;
        assert_eq!(age_cutoff(&policy, now), Some(now - Duration::days(7)));
    }
}

//! Deal health and potential scoring.
//!
//! Health starts at 100 and loses fixed penalties for data-hygiene problems;
//! potential grows logarithmically with the deal amount and is weighted by the
//! close probability. Both are integers in `[0, 100]`.

use crate::application::use_cases::stage_rules::{is_lost_stage, StageRules};
use crate::domain::crm::CrmDirectory;
use crate::domain::deal::{DealFlags, RawDeal, ScoredDeal};
use chrono::NaiveDateTime;
use tracing::debug;

pub const DEFAULT_STUCK_DAYS: i64 = 5;

const NO_COMPANY_PENALTY: i64 = 10;
const NO_CONTACT_PENALTY: i64 = 10;
const NO_TASKS_PENALTY: i64 = 25;
const STUCK_PENALTY: i64 = 25;
const LOST_HEALTH_CAP: i64 = 15;

pub fn health_score(flags: &DealFlags) -> u8 {
    let mut score: i64 = 100;
    if flags.no_company {
        score -= NO_COMPANY_PENALTY;
    }
    if flags.no_contact {
        score -= NO_CONTACT_PENALTY;
    }
    if flags.no_tasks {
        score -= NO_TASKS_PENALTY;
    }
    if flags.stuck {
        score -= STUCK_PENALTY;
    }
    if flags.lost {
        score = score.min(LOST_HEALTH_CAP);
    }
    score.clamp(0, 100) as u8
}

pub fn potential_score(amount: f64, probability: f64) -> u8 {
    if !(amount > 0.0) {
        return 0;
    }
    let magnitude = (amount.max(1.0).log10() / 5.0 * 70.0).min(70.0);
    let weight = 0.4 + probability / 100.0 * 0.6;
    let raw = ((30.0 + magnitude) * weight).min(100.0);
    if !raw.is_finite() {
        return 0;
    }
    (raw.trunc() as i64).clamp(0, 100) as u8
}

/// Whole days from `earlier` to `later`, never negative; `None` when unknown.
pub fn days_between(later: NaiveDateTime, earlier: Option<NaiveDateTime>) -> Option<i64> {
    earlier.map(|earlier| (later - earlier).num_days().max(0))
}

pub struct ScoringContext<'a> {
    pub now: NaiveDateTime,
    pub stuck_days: i64,
    pub directory: &'a CrmDirectory,
    pub rules: &'a StageRules,
}

/// Flags for a raw deal given its open-task state and idle time.
pub fn derive_flags(raw: &RawDeal, has_open_tasks: bool, days_no_activity: i64, stuck_days: i64) -> DealFlags {
    DealFlags {
        no_company: !raw.has_company(),
        no_contact: !raw.has_contact(),
        no_tasks: !has_open_tasks,
        stuck: days_no_activity >= stuck_days,
        lost: is_lost_stage(raw.stage_id.as_deref().unwrap_or_default()),
    }
}

pub fn score_deal(raw: &RawDeal, ctx: &ScoringContext<'_>) -> Option<ScoredDeal> {
    let id = raw.deal_id()?;
    let created_at = raw.created_at();
    let modified_at = raw.modified_at();
    let last_activity_at = raw.last_activity_at().or(modified_at).or(created_at);
    let stage_started_at = ctx
        .directory
        .stage_entered
        .get(&id)
        .copied()
        .or_else(|| raw.begin_at())
        .or(created_at);

    let days_in_work = days_between(ctx.now, created_at).unwrap_or(0);
    let days_no_activity = days_between(ctx.now, last_activity_at).unwrap_or(0);
    let days_in_stage = days_between(ctx.now, stage_started_at).unwrap_or(0);

    let flags = derive_flags(
        raw,
        ctx.directory.has_open_tasks(id),
        days_no_activity,
        ctx.stuck_days,
    );

    let amount = raw.amount();
    let probability = raw.probability_pct();
    let stage_id = raw.stage_id.clone().unwrap_or_default();
    let stage_name = ctx.directory.stage_name(&stage_id);
    let category_id = raw.category();
    let funnel = ctx.directory.funnel_name(category_id);
    let manager_id = raw.manager_id();

    Some(ScoredDeal {
        id,
        title: raw.title.clone().unwrap_or_default(),
        manager_id,
        manager: ctx.directory.manager_name(manager_id),
        success: ctx.rules.is_success(&stage_name, &stage_id, &funnel),
        failure: ctx.rules.is_failure(&stage_name, &stage_id),
        stage_id,
        stage_name,
        category_id,
        funnel,
        amount,
        probability,
        created_at,
        modified_at,
        last_activity_at,
        stage_started_at,
        closed_at: raw.closed_at(),
        closed: raw.is_closed(),
        days_in_work,
        days_no_activity,
        days_in_stage,
        health: health_score(&flags),
        potential: potential_score(amount, probability),
        flags,
    })
}

pub fn score_deals(raws: &[RawDeal], ctx: &ScoringContext<'_>) -> Vec<ScoredDeal> {
    let scored: Vec<ScoredDeal> = raws.iter().filter_map(|raw| score_deal(raw, ctx)).collect();
    if scored.len() != raws.len() {
        debug!(
            skipped = raws.len() - scored.len(),
            "Skipped deals without a numeric ID"
        );
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn flags(no_company: bool, no_contact: bool, no_tasks: bool, stuck: bool, lost: bool) -> DealFlags {
        DealFlags { no_company, no_contact, no_tasks, stuck, lost }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_health_penalties() {
        assert_eq!(health_score(&DealFlags::default()), 100);
        assert_eq!(health_score(&flags(true, false, false, false, false)), 90);
        assert_eq!(health_score(&flags(true, true, false, false, false)), 80);
        assert_eq!(health_score(&flags(false, false, true, false, false)), 75);
        assert_eq!(health_score(&flags(true, true, true, true, false)), 30);
    }

    #[test]
    fn test_health_always_in_range_and_capped_when_lost() {
        for bits in 0u8..32 {
            let f = flags(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0, bits & 16 != 0);
            let health = health_score(&f);
            assert!(health <= 100);
            if f.lost {
                assert!(health <= 15, "lost deal scored {}", health);
            }
        }
    }

    #[test]
    fn test_potential_examples() {
        assert_eq!(potential_score(0.0, 100.0), 0);
        assert_eq!(potential_score(-10.0, 50.0), 0);
        assert_eq!(potential_score(0.0, 0.0), 0);
        assert_eq!(potential_score(1_000_000.0, 100.0), 100);
        // log10(1000)=3 -> 30 + 42 = 72, weight 0.4 -> 28.8
        assert_eq!(potential_score(1000.0, 0.0), 28);
        // weight 0.7 -> 50.4
        assert_eq!(potential_score(1000.0, 50.0), 50);
    }

    #[test]
    fn test_potential_monotonic_in_probability_and_amount() {
        let amounts = [0.5, 1.0, 9.0, 150.0, 12_000.0, 480_000.0, 3_000_000.0, 1e9];
        for amount in amounts {
            let mut previous = 0;
            for probability in (0..=100).step_by(5) {
                let p = potential_score(amount, probability as f64);
                assert!(p >= previous, "amount {} prob {}", amount, probability);
                previous = p;
            }
        }
        for probability in [0.0, 10.0, 55.0, 100.0] {
            let mut previous = 0;
            for amount in amounts {
                let p = potential_score(amount, probability);
                assert!(p >= previous, "amount {} prob {}", amount, probability);
                previous = p;
            }
        }
    }

    #[test]
    fn test_days_between_clamps_future_timestamps() {
        let later = now();
        assert_eq!(days_between(later, Some(later - chrono::Duration::hours(49))), Some(2));
        assert_eq!(days_between(later, Some(later + chrono::Duration::days(3))), Some(0));
        assert_eq!(days_between(later, None), None);
    }

    #[test]
    fn test_score_deal_without_tasks_and_stale() {
        let directory = CrmDirectory::default();
        let rules = StageRules::default();
        let ctx = ScoringContext { now: now(), stuck_days: 5, directory: &directory, rules: &rules };
        let raw = RawDeal {
            id: Some("7".into()),
            title: Some("Boiler".into()),
            stage_id: Some("C1:EXECUTING".into()),
            opportunity: Some("25000".into()),
            company_id: Some("3".into()),
            contact_id: Some("4".into()),
            date_create: Some("2025-06-01T10:00:00+00:00".into()),
            last_activity_time: Some("2025-06-20T10:00:00+00:00".into()),
            ..Default::default()
        };

        let scored = score_deal(&raw, &ctx).unwrap();
        assert_eq!(scored.days_no_activity, 10);
        assert_eq!(scored.days_in_work, 29);
        assert!(scored.flags.no_tasks);
        assert!(scored.flags.stuck);
        assert!(scored.health <= 50);
        assert_eq!(scored.health, 50);
        assert_eq!(scored.category_id, 0);
        assert_eq!(scored.manager, "Unknown");
    }

    #[test]
    fn test_score_deal_falls_back_to_modify_then_create_for_activity() {
        let mut directory = CrmDirectory::default();
        directory.open_tasks.insert(8, 2);
        let rules = StageRules::default();
        let ctx = ScoringContext { now: now(), stuck_days: 5, directory: &directory, rules: &rules };
        let raw = RawDeal {
            id: Some("8".into()),
            stage_id: Some("LOSE".into()),
            date_create: Some("2025-06-01".into()),
            date_modify: Some("2025-06-29".into()),
            ..Default::default()
        };

        let scored = score_deal(&raw, &ctx).unwrap();
        assert_eq!(scored.days_no_activity, 1);
        assert!(!scored.flags.no_tasks);
        assert!(scored.flags.lost);
        assert!(scored.failure);
        assert_eq!(scored.health, 15);
        assert_eq!(scored.potential, 0);
    }

    #[test]
    fn test_score_deals_skips_rows_without_id() {
        let directory = CrmDirectory::default();
        let rules = StageRules::default();
        let ctx = ScoringContext { now: now(), stuck_days: 5, directory: &directory, rules: &rules };
        let raws = vec![
            RawDeal { id: Some("1".into()), ..Default::default() },
            RawDeal { id: None, ..Default::default() },
            RawDeal { id: Some("abc".into()), ..Default::default() },
        ];
        assert_eq!(score_deals(&raws, &ctx).len(), 1);
    }
}

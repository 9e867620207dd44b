// [tests/mirror/apps/orchestrator/cron_schedule.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL PLANIFICADOR CRON (V4.0 - MESH)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: EXPRESIONES DE LA MATRIZ DE JOBS Y DEADLINES
 * =================================================================
 */

use chrono::{Duration, TimeZone, Utc};
use edgelink_orchestrator::services::cron::CronSchedule;

#[cfg(test)]
mod tests {
    use super::*;

    /// Las cinco expresiones de la matriz de jobs por defecto compilan.
    #[test]
    fn default_job_matrix_expressions_are_valid() {
        for expression in ["* * * * *", "*/5 * * * *", "0 2 * * *", "*/30 * * * *"] {
            assert!(
                CronSchedule::parse(expression).is_ok(),
                "expression '{expression}' must parse"
            );
        }
    }

    /// El deadline de medio periodo se deriva de la cadencia real.
    #[test]
    fn half_period_deadline_tracks_cadence() {
        let reference = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 30).unwrap();

        let probe = CronSchedule::parse("* * * * *").unwrap();
        assert_eq!(
            probe.estimated_period(reference).unwrap() / 2,
            Duration::seconds(30)
        );

        let rollup = CronSchedule::parse("*/5 * * * *").unwrap();
        assert_eq!(
            rollup.estimated_period(reference).unwrap() / 2,
            Duration::seconds(150)
        );

        let nightly = CronSchedule::parse("0 2 * * *").unwrap();
        assert_eq!(
            nightly.estimated_period(reference).unwrap() / 2,
            Duration::hours(12)
        );
    }

    /// El barrido nocturno dispara exactamente a las 02:00 UTC.
    #[test]
    fn nightly_sweep_fires_at_two_am() {
        let nightly = CronSchedule::parse("0 2 * * *").unwrap();
        let before_midnight = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(
            nightly.next_after(before_midnight).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap()
        );
    }
}

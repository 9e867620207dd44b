// [apps/orchestrator/src/services/cron.rs]
/*!
 * =================================================================
 * APARATO: CRON EXPRESSION ENGINE (V4.1 - FIVE FIELD)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: INTERPRETACIÓN DE EXPRESIONES Y PRÓXIMO DISPARO
 *
 * # Wire Format:
 * Cinco campos separados por espacio: `min hora día-mes mes día-semana`
 * con soporte de `*`, listas (`1,15`), rangos (`1-5`) y pasos (`*\/5`).
 * Día-semana: 0-6 con domingo = 0 (7 se normaliza a 0).
 *
 * # Mathematical Proof (Next-Fire Termination):
 * La búsqueda avanza minuto a minuto con horizonte de 366 días: toda
 * expresión válida tiene al menos un disparo dentro del horizonte
 * (el mes y día válidos se repiten anualmente), luego termina.
 * =================================================================
 */

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::collections::BTreeSet;

/// Expresión cron compilada a conjuntos de valores admitidos.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    source_expression: String,
}

impl CronSchedule {
    /**
     * Compila la expresión de cinco campos.
     *
     * # Errors:
     * Mensaje descriptivo ante aridad incorrecta, valores fuera de
     * rango o sintaxis no reconocida.
     */
    pub fn parse(expression: &str) -> Result<CronSchedule, String> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "CRON_ARITY: expected 5 fields, found {} in '{expression}'",
                fields.len()
            ));
        }

        Ok(CronSchedule {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
            days_of_month: parse_field(fields[2], 1, 31)?,
            months: parse_field(fields[3], 1, 12)?,
            days_of_week: parse_field(fields[4], 0, 7)?
                .into_iter()
                .map(|day| if day == 7 { 0 } else { day })
                .collect(),
            source_expression: expression.to_string(),
        })
    }

    pub fn expression(&self) -> &str {
        &self.source_expression
    }

    fn admits(&self, instant: DateTime<Utc>) -> bool {
        self.minutes.contains(&instant.minute())
            && self.hours.contains(&instant.hour())
            && self.days_of_month.contains(&instant.day())
            && self.months.contains(&instant.month())
            && self
                .days_of_week
                .contains(&(instant.weekday().num_days_from_sunday()))
    }

    /// Próximo disparo estrictamente posterior al instante dado.
    pub fn next_after(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Truncamos a frontera de minuto y avanzamos.
        let mut candidate = instant
            .with_second(0)
            .and_then(|truncated| truncated.with_nanosecond(0))?
            + Duration::minutes(1);

        let horizon = instant + Duration::days(366);
        while candidate <= horizon {
            if self.admits(candidate) {
                return Some(candidate);
            }
            candidate = candidate + Duration::minutes(1);
        }
        None
    }

    /// Periodo nominal estimado: distancia entre los dos próximos
    /// disparos. Gobierna el deadline (= ½ periodo) de los jobs.
    pub fn estimated_period(&self, reference: DateTime<Utc>) -> Option<Duration> {
        let first = self.next_after(reference)?;
        let second = self.next_after(first)?;
        Some(second - first)
    }
}

fn parse_field(field: &str, floor: u32, ceiling: u32) -> Result<BTreeSet<u32>, String> {
    let mut admitted = BTreeSet::new();

    for token in field.split(',') {
        let (body, step) = match token.split_once('/') {
            Some((body, step_raw)) => {
                let step: u32 = step_raw
                    .parse()
                    .map_err(|_| format!("CRON_STEP: '{step_raw}'"))?;
                if step == 0 {
                    return Err("CRON_STEP: zero step".into());
                }
                (body, step)
            }
            None => (token, 1),
        };

        let (range_floor, range_ceiling) = if body == "*" {
            (floor, ceiling)
        } else if let Some((low_raw, high_raw)) = body.split_once('-') {
            let low: u32 = low_raw.parse().map_err(|_| format!("CRON_RANGE: '{body}'"))?;
            let high: u32 = high_raw.parse().map_err(|_| format!("CRON_RANGE: '{body}'"))?;
            if low > high {
                return Err(format!("CRON_RANGE: inverted '{body}'"));
            }
            (low, high)
        } else {
            let value: u32 = body.parse().map_err(|_| format!("CRON_VALUE: '{body}'"))?;
            (value, value)
        };

        if range_floor < floor || range_ceiling > ceiling {
            return Err(format!(
                "CRON_BOUNDS: '{token}' outside [{floor}, {ceiling}]"
            ));
        }

        let mut value = range_floor;
        while value <= range_ceiling {
            admitted.insert(value);
            value += step;
        }
    }

    if admitted.is_empty() {
        return Err(format!("CRON_EMPTY: '{field}'"));
    }
    Ok(admitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn every_minute_fires_on_the_next_boundary() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let next = schedule.next_after(at(2026, 3, 1, 10, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 1, 10, 1));
    }

    #[test]
    fn five_minute_steps_land_on_multiples() {
        let schedule = CronSchedule::parse("*/5 * * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 3, 1, 10, 2)).unwrap(),
            at(2026, 3, 1, 10, 5)
        );
        assert_eq!(
            schedule.next_after(at(2026, 3, 1, 10, 5)).unwrap(),
            at(2026, 3, 1, 10, 10)
        );
    }

    #[test]
    fn daily_two_am_crosses_the_day_boundary() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 3, 1, 3, 0)).unwrap(),
            at(2026, 3, 2, 2, 0)
        );
    }

    #[test]
    fn weekday_field_honors_sunday_zero_and_seven() {
        // 2026-03-01 es domingo.
        let sunday_zero = CronSchedule::parse("0 12 * * 0").unwrap();
        assert_eq!(
            sunday_zero.next_after(at(2026, 2, 28, 0, 0)).unwrap(),
            at(2026, 3, 1, 12, 0)
        );

        let sunday_seven = CronSchedule::parse("0 12 * * 7").unwrap();
        assert_eq!(
            sunday_seven.next_after(at(2026, 2, 28, 0, 0)).unwrap(),
            at(2026, 3, 1, 12, 0)
        );
    }

    #[test]
    fn lists_and_ranges_compose() {
        let schedule = CronSchedule::parse("0 9-11,14 * * 1-5").unwrap();
        // 2026-03-02 es lunes.
        assert_eq!(
            schedule.next_after(at(2026, 3, 1, 0, 0)).unwrap(),
            at(2026, 3, 2, 9, 0)
        );
        assert_eq!(
            schedule.next_after(at(2026, 3, 2, 11, 0)).unwrap(),
            at(2026, 3, 2, 14, 0)
        );
    }

    #[test]
    fn estimated_period_reflects_cadence() {
        let minute = CronSchedule::parse("* * * * *").unwrap();
        assert_eq!(
            minute.estimated_period(at(2026, 3, 1, 0, 0)).unwrap(),
            Duration::minutes(1)
        );

        let five = CronSchedule::parse("*/5 * * * *").unwrap();
        assert_eq!(
            five.estimated_period(at(2026, 3, 1, 0, 1)).unwrap(),
            Duration::minutes(5)
        );
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(CronSchedule::parse("* * * *").is_err());
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-2 * * * *").is_err());
        assert!(CronSchedule::parse("a * * * *").is_err());
    }
}

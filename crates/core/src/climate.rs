//! Daily climate input, per-year aggregates, phenology groups, and the
//! solar daylength subsystem (§3 "Climate day", "Climate table",
//! "Phenology group").

use crate::config::PhenologyGroupConfig;
use crate::error::ClimateError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One calendar day of climate input (§3 "Climate day").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateDay {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub min_temp: f64,
    pub max_temp: f64,
    pub mean_temp: f64,
    /// Delayed (tissue) temperature: an exponentially smoothed mean_temp.
    pub delayed_temp: f64,
    pub precipitation: f64,
    pub radiation: f64,
    pub vpd: f64,
}

impl ClimateDay {
    pub fn validate_bounds(&self) -> Result<(), String> {
        if !(-70.0..=50.0).contains(&self.mean_temp) {
            return Err(format!("mean_temp {} out of [-70,50]", self.mean_temp));
        }
        if !(0.0..=200.0).contains(&self.precipitation) {
            return Err(format!("precipitation {} out of [0,200]", self.precipitation));
        }
        if !(0.0..=50.0).contains(&self.radiation) {
            return Err(format!("radiation {} out of [0,50]", self.radiation));
        }
        if !(0.0..=10.0).contains(&self.vpd) {
            return Err(format!("vpd {} out of [0,10]", self.vpd));
        }
        Ok(())
    }
}

/// Legacy relational row shape (§6 "Climate input" fallback): `max_temp` is
/// absent and filled in from `temp`.
pub struct LegacyClimateRow {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub temp: f64,
    pub min_temp: f64,
    pub precipitation: f64,
    pub radiation: f64,
    pub vpd: f64,
}

impl From<LegacyClimateRow> for ClimateDay {
    fn from(row: LegacyClimateRow) -> Self {
        ClimateDay {
            year: row.year,
            month: row.month,
            day: row.day,
            min_temp: row.min_temp,
            max_temp: row.temp,
            mean_temp: row.temp,
            delayed_temp: row.temp,
            precipitation: row.precipitation,
            radiation: row.radiation,
            vpd: row.vpd,
        }
    }
}

/// Precomputed per-day-of-year solar daylength hours and the two
/// threshold DOYs the phenology subsystem consults (§3 "solar subsystem").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarTable {
    /// Daylength in hours, indexed by DOY-1 (0..365).
    pub day_length_hours: Vec<f64>,
    /// Last DOY (1-based) with daylength > 10.5h.
    pub last_doy_above_10_5h: u32,
    /// Last DOY (1-based) with daylength > 14.5h.
    pub last_doy_above_14_5h: u32,
}

impl SolarTable {
    /// Build from a latitude in degrees using the standard declination
    /// approximation; 365 fixed days (leap days are not separately modeled).
    pub fn from_latitude(latitude_deg: f64) -> Self {
        let lat_rad = latitude_deg.to_radians();
        let mut hours = Vec::with_capacity(365);
        for doy in 1..=365u32 {
            let decl = 0.409 * ((2.0 * std::f64::consts::PI / 365.0) * (doy as f64) - 1.39).sin();
            let cos_ha = (-lat_rad.tan() * decl.tan()).clamp(-1.0, 1.0);
            let hour_angle = cos_ha.acos();
            let hours_of_day = 24.0 / std::f64::consts::PI * hour_angle;
            hours.push(hours_of_day);
        }
        let last_above = |threshold: f64| -> u32 {
            hours
                .iter()
                .enumerate()
                .filter(|(_, &h)| h > threshold)
                .map(|(i, _)| (i + 1) as u32)
                .max()
                .unwrap_or(0)
        };
        Self {
            last_doy_above_10_5h: last_above(10.5),
            last_doy_above_14_5h: last_above(14.5),
            day_length_hours: hours,
        }
    }

    pub fn hours_on(&self, doy: u32) -> f64 {
        self.day_length_hours
            .get((doy.saturating_sub(1)) as usize)
            .copied()
            .unwrap_or(12.0)
    }
}

/// Derives a 0..1 growing-season index series from daily climate given a
/// phenology group's parameter envelope (§3 "Phenology group").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhenologyGroup {
    pub id: i32,
    pub vpd_min: f64,
    pub vpd_max: f64,
    pub day_length_min: f64,
    pub day_length_max: f64,
    pub temp_min: f64,
    pub temp_max: f64,
}

impl From<&PhenologyGroupConfig> for PhenologyGroup {
    fn from(cfg: &PhenologyGroupConfig) -> Self {
        Self {
            id: cfg.id,
            vpd_min: cfg.vpd_min,
            vpd_max: cfg.vpd_max,
            day_length_min: cfg.day_length_min,
            day_length_max: cfg.day_length_max,
            temp_min: cfg.temp_min,
            temp_max: cfg.temp_max,
        }
    }
}

fn ramp(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return if value >= hi { 1.0 } else { 0.0 };
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

impl PhenologyGroup {
    /// Growing-season index for one day: the product of three 0..1 ramps
    /// over VPD, daylength and temperature envelopes.
    pub fn growing_season_index(&self, day: &ClimateDay, day_length_hours: f64) -> f64 {
        let f_vpd = 1.0 - ramp(day.vpd, self.vpd_min, self.vpd_max);
        let f_daylength = ramp(day_length_hours, self.day_length_min, self.day_length_max);
        let f_temp = ramp(day.mean_temp, self.temp_min, self.temp_max);
        f_vpd * f_daylength * f_temp
    }
}

/// Annual aggregates derived from one calendar year's worth of days (§3
/// "Climate table" derived aggregates).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnualAggregate {
    pub sum_radiation: f64,
    pub mean_annual_temp: f64,
    pub monthly_precipitation: [f64; 12],
    pub monthly_temperature: [f64; 12],
}

impl AnnualAggregate {
    pub fn from_days(days: &[ClimateDay]) -> Self {
        let mut agg = AnnualAggregate::default();
        if days.is_empty() {
            return agg;
        }
        let mut temp_sum = 0.0;
        let mut month_counts = [0u32; 12];
        for day in days {
            agg.sum_radiation += day.radiation;
            temp_sum += day.mean_temp;
            let m = (day.month.saturating_sub(1).min(11)) as usize;
            agg.monthly_precipitation[m] += day.precipitation;
            agg.monthly_temperature[m] += day.mean_temp;
            month_counts[m] += 1;
        }
        agg.mean_annual_temp = temp_sum / days.len() as f64;
        for m in 0..12 {
            if month_counts[m] > 0 {
                agg.monthly_temperature[m] /= month_counts[m] as f64;
            }
        }
        agg
    }
}

/// Per-climate ordered sequence of days, batch-loaded and optionally
/// randomly sampled so the chosen year is identical across the landscape
/// at a given simulated year (§3, §9 "Random generators").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateTable {
    pub name: String,
    /// Days grouped by year, in input order (already validated contiguous).
    years: Vec<Vec<ClimateDay>>,
    pub random_sampling_enabled: bool,
    pub random_sampling_list: Vec<u32>,
    pub solar: SolarTable,
    pub phenology_groups: Vec<PhenologyGroup>,
    /// Shared history of which input-year index was chosen for each
    /// simulated year so far (§9: "random-year sample history is
    /// appended in RU-order with a monotone length check").
    chosen_year_history: Vec<usize>,
}

impl ClimateTable {
    pub fn from_years(
        name: String,
        years: Vec<Vec<ClimateDay>>,
        latitude_deg: f64,
        phenology_groups: Vec<PhenologyGroup>,
        random_sampling_enabled: bool,
        random_sampling_list: Vec<u32>,
    ) -> Result<Self, ClimateError> {
        for year_days in &years {
            let mut prev: Option<ClimateDay> = None;
            for day in year_days {
                if let Some(p) = prev {
                    let contiguous = (p.year == day.year && next_day(p) == (day.month, day.day))
                        || (day.month == 1 && day.day == 1 && day.year == p.year + 1);
                    if !contiguous {
                        return Err(ClimateError::NonContiguousDates {
                            year: day.year,
                            month: day.month,
                            day: day.day,
                        });
                    }
                }
                prev = Some(*day);
            }
        }
        Ok(Self {
            name,
            years,
            random_sampling_enabled,
            random_sampling_list,
            solar: SolarTable::from_latitude(latitude_deg),
            phenology_groups,
            chosen_year_history: Vec::new(),
        })
    }

    pub fn year_count(&self) -> usize {
        self.years.len()
    }

    /// Advance to the next simulated year, appending to the shared
    /// choice history and returning the days for that year (§4.1 step 2).
    pub fn advance_year(&mut self, simulated_year: u32) -> Result<&[ClimateDay], ClimateError> {
        let index = if self.random_sampling_enabled {
            self.sample_year_index(simulated_year)?
        } else {
            (simulated_year as usize) % self.years.len().max(1)
        };
        if self.chosen_year_history.len() as u32 <= simulated_year {
            self.chosen_year_history.push(index);
        }
        self.years
            .get(index)
            .map(|d| d.as_slice())
            .ok_or(ClimateError::InsufficientYears {
                available: self.years.len() as u32,
                required: simulated_year + 1,
            })
    }

    fn sample_year_index(&self, simulated_year: u32) -> Result<usize, ClimateError> {
        if !self.random_sampling_list.is_empty() {
            let i = (simulated_year as usize) % self.random_sampling_list.len();
            return Ok(self.random_sampling_list[i] as usize % self.years.len().max(1));
        }
        if self.years.is_empty() {
            return Err(ClimateError::InsufficientYears {
                available: 0,
                required: simulated_year + 1,
            });
        }
        // Deterministic pseudo-sample from the simulated year index itself;
        // actual draws for the shared history go through `sample_with_rng`.
        Ok((simulated_year as usize) % self.years.len())
    }

    /// Same contract as `advance_year` but draws the index from a supplied
    /// RNG, for callers that want the shared per-landscape random-year
    /// history driven by `SimRng` rather than a deterministic fallback.
    pub fn sample_with_rng<R: Rng>(&mut self, rng: &mut R) -> Result<&[ClimateDay], ClimateError> {
        if self.years.is_empty() {
            return Err(ClimateError::InsufficientYears {
                available: 0,
                required: 1,
            });
        }
        let index = if !self.random_sampling_list.is_empty() {
            let pick = rng.gen_range(0..self.random_sampling_list.len());
            self.random_sampling_list[pick] as usize % self.years.len()
        } else {
            rng.gen_range(0..self.years.len())
        };
        self.chosen_year_history.push(index);
        Ok(self.years[index].as_slice())
    }

    pub fn chosen_year_history(&self) -> &[usize] {
        &self.chosen_year_history
    }

    pub fn annual_aggregate(&self, year_index: usize) -> AnnualAggregate {
        self.years
            .get(year_index)
            .map(|days| AnnualAggregate::from_days(days))
            .unwrap_or_default()
    }
}

fn next_day(d: ClimateDay) -> (u8, u8) {
    const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let last_day = DAYS_IN_MONTH[(d.month - 1) as usize];
    if d.day >= last_day {
        (d.month + 1, 1)
    } else {
        (d.month, d.day + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(year: i32, month: u8, day: u8) -> ClimateDay {
        ClimateDay {
            year,
            month,
            day,
            min_temp: 5.0,
            max_temp: 15.0,
            mean_temp: 10.0,
            delayed_temp: 10.0,
            precipitation: 2.0,
            radiation: 10.0,
            vpd: 1.0,
        }
    }

    #[test]
    fn rejects_non_contiguous_dates() {
        let years = vec![vec![day(2020, 1, 1), day(2020, 1, 3)]];
        let err = ClimateTable::from_years(
            "t".into(),
            years,
            48.0,
            vec![],
            false,
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ClimateError::NonContiguousDates { .. }));
    }

    #[test]
    fn random_sampling_history_is_shared_and_monotone() {
        let years: Vec<Vec<ClimateDay>> = (0..10)
            .map(|_| vec![day(2020, 1, 1), day(2020, 1, 2)])
            .collect();
        let mut table =
            ClimateTable::from_years("t".into(), years, 48.0, vec![], true, vec![]).unwrap();
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1u64);
        for _ in 0..5 {
            table.sample_with_rng(&mut rng).unwrap();
        }
        assert_eq!(table.chosen_year_history().len(), 5);
    }

    #[test]
    fn solar_table_thresholds_are_symmetric_around_summer() {
        let solar = SolarTable::from_latitude(48.0);
        assert!(solar.last_doy_above_14_5h > solar.last_doy_above_10_5h);
    }

    #[test]
    fn growing_season_index_is_zero_outside_envelope() {
        let group = PhenologyGroup {
            id: 0,
            vpd_min: 0.0,
            vpd_max: 2.0,
            day_length_min: 10.0,
            day_length_max: 14.0,
            temp_min: 5.0,
            temp_max: 25.0,
        };
        let cold_day = day(2020, 1, 1);
        let mut cold_day = cold_day;
        cold_day.mean_temp = -10.0;
        assert_eq!(group.growing_season_index(&cold_day, 12.0), 0.0);
    }
}

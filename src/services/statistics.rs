//! Small numerical helpers shared by the scorer, extractor and slice analyzer.

use crate::domain::models::PValueCorrection;

/// Nearest-rank percentile: `sorted[min(floor(p * n), n - 1)]`.
///
/// Returns `None` for an empty sample. Non-finite values must be filtered
/// out by the caller.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

/// Mean and population standard deviation of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl ColumnStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std_dev: 0.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Z-score of `value`; 0 when the column has no spread.
    pub fn standardize(&self, value: f64) -> f64 {
        if self.std_dev > f64::EPSILON {
            (value - self.mean) / self.std_dev
        } else {
            0.0
        }
    }
}

/// 2x2 contingency table: {in slice, rest of batch} x {bad, good}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    pub slice_bad: u64,
    pub slice_good: u64,
    pub rest_bad: u64,
    pub rest_good: u64,
}

impl ContingencyTable {
    /// Build the table for a slice against the whole batch.
    ///
    /// Returns `None` when the slice counts are inconsistent with the batch
    /// totals.
    pub fn for_slice(slice_bad: usize, slice_size: usize, total_bad: usize, total: usize) -> Option<Self> {
        if slice_bad > slice_size || slice_size > total || slice_bad > total_bad || total_bad > total {
            return None;
        }
        let rest_bad = total_bad - slice_bad;
        let rest_size = total - slice_size;
        if rest_bad > rest_size {
            return None;
        }
        Some(Self {
            slice_bad: slice_bad as u64,
            slice_good: (slice_size - slice_bad) as u64,
            rest_bad: rest_bad as u64,
            rest_good: (rest_size - rest_bad) as u64,
        })
    }

    /// Pearson chi-squared statistic with Yates' continuity correction.
    ///
    /// Each `|observed - expected|` is reduced by `min(0.5, |observed - expected|)`.
    /// Returns `None` when any expected count is zero (an empty row or column),
    /// where the test is undefined.
    pub fn chi_squared_yates(&self) -> Option<f64> {
        let observed = [
            [self.slice_bad as f64, self.slice_good as f64],
            [self.rest_bad as f64, self.rest_good as f64],
        ];
        let row = [observed[0][0] + observed[0][1], observed[1][0] + observed[1][1]];
        let col = [observed[0][0] + observed[1][0], observed[0][1] + observed[1][1]];
        let total = row[0] + row[1];
        if total == 0.0 {
            return None;
        }

        let mut statistic = 0.0;
        for (i, row_total) in row.iter().enumerate() {
            for (j, col_total) in col.iter().enumerate() {
                let expected = row_total * col_total / total;
                if expected == 0.0 {
                    return None;
                }
                let diff = (observed[i][j] - expected).abs();
                let corrected = diff - diff.min(0.5);
                statistic += corrected * corrected / expected;
            }
        }
        Some(statistic)
    }

    /// p-value of the chi-squared independence test; 1.0 when undefined.
    pub fn p_value(&self) -> f64 {
        self.chi_squared_yates().map_or(1.0, chi_squared_sf_1df)
    }
}

/// Survival function of the chi-squared distribution with one degree of
/// freedom: `P(X >= x) = erfc(sqrt(x / 2))`.
pub fn chi_squared_sf_1df(x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    erfc((x / 2.0).sqrt()).clamp(0.0, 1.0)
}

/// Complementary error function (Chebyshev fit, fractional error < 1.2e-7).
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

/// Adjust a family of p-values for multiple comparisons.
///
/// The output is index-aligned with the input.
pub fn adjust_p_values(p_values: &[f64], correction: PValueCorrection) -> Vec<f64> {
    let m = p_values.len();
    match correction {
        PValueCorrection::None => p_values.to_vec(),
        PValueCorrection::Bonferroni => p_values
            .iter()
            .map(|p| (p * m as f64).min(1.0))
            .collect(),
        PValueCorrection::BenjaminiHochberg => {
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

            let mut adjusted = vec![1.0; m];
            let mut running_min: f64 = 1.0;
            for (rank_from_end, &idx) in order.iter().enumerate().rev() {
                let rank = rank_from_end + 1;
                let candidate = p_values[idx] * m as f64 / rank as f64;
                running_min = running_min.min(candidate);
                adjusted[idx] = running_min.min(1.0);
            }
            adjusted
        }
    }
}

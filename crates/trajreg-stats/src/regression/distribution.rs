use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// Two-sided p-value of a t statistic.
pub(super) fn t_test(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    StudentsT::new(0.0, 1.0, df).map_or(f64::NAN, |dist| 2.0 * dist.sf(t.abs()))
}

/// Upper-tail p-value of an F statistic.
pub(super) fn f_test(f: f64, df_model: f64, df_resid: f64) -> f64 {
    if f.is_nan() || df_model.is_nan() || df_resid.is_nan() || df_model <= 0.0 || df_resid <= 0.0 {
        return f64::NAN;
    }
    if f.is_infinite() {
        return 0.0;
    }
    FisherSnedecor::new(df_model, df_resid).map_or(f64::NAN, |dist| dist.sf(f.max(0.0)))
}

/// Two-sided p-value of a standard normal statistic.
pub(super) fn z_test(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z.is_infinite() {
        return 0.0;
    }
    Normal::new(0.0, 1.0).map_or(f64::NAN, |dist| 2.0 * dist.sf(z.abs()))
}

/// Upper-tail p-value of a chi-squared statistic.
pub(super) fn chi_squared_test(statistic: f64, df: f64) -> f64 {
    if statistic.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    ChiSquared::new(df).map_or(f64::NAN, |dist| dist.sf(statistic.max(0.0)))
}

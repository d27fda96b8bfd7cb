//! Training parameters, the split-rule and family enums, and boundary
//! validation.

use crate::data::Data;
use crate::error::{Error, Result};

/// The two tree families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeFamily {
    Classification,
    Regression,
}

impl TreeFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            TreeFamily::Classification => "classification",
            TreeFamily::Regression => "regression",
        }
    }

    pub fn parse(s: &str) -> Result<TreeFamily> {
        match s {
            "classification" => Ok(TreeFamily::Classification),
            "regression" => Ok(TreeFamily::Regression),
            _ => Err(Error::Serialization(format!("unknown tree family tag '{}'", s))),
        }
    }
}

/// Node-splitting rules. `Logrank` is the unified Gini / variance
/// reduction score, persisted as `gini` or `variance` depending on the
/// family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitRule {
    Logrank,
    Extratrees,
    Beta,
    Maxstat,
    Hellinger,
}

impl SplitRule {
    pub fn canonical_str(self, family: TreeFamily) -> &'static str {
        match self {
            SplitRule::Logrank => match family {
                TreeFamily::Classification => "gini",
                TreeFamily::Regression => "variance",
            },
            SplitRule::Extratrees => "extratrees",
            SplitRule::Beta => "beta",
            SplitRule::Maxstat => "maxstat",
            SplitRule::Hellinger => "hellinger",
        }
    }

    pub fn parse(s: &str) -> Result<SplitRule> {
        match s {
            "gini" | "variance" => Ok(SplitRule::Logrank),
            "extratrees" => Ok(SplitRule::Extratrees),
            "beta" => Ok(SplitRule::Beta),
            "maxstat" => Ok(SplitRule::Maxstat),
            "hellinger" => Ok(SplitRule::Hellinger),
            _ => Err(Error::Serialization(format!("unknown split rule '{}'", s))),
        }
    }
}

/// Forest-level prediction aggregation modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictionMode {
    Bagged,
    Inbag,
    Nodes,
}

impl PredictionMode {
    pub fn parse(s: &str) -> Result<PredictionMode> {
        match s {
            "bagged" => Ok(PredictionMode::Bagged),
            "inbag" => Ok(PredictionMode::Inbag),
            "nodes" => Ok(PredictionMode::Nodes),
            _ => Err(Error::invalid(format!(
                "prediction type must be one of bagged, inbag, nodes; got '{}'",
                s
            ))),
        }
    }
}

/// Default significance level for the MAXSTAT rule; `min_metric_decrease`
/// starts at its negation.
pub const DEFAULT_MAXSTAT_ALPHA: f64 = 0.5;

/// Sampling, drawing and splitting policy for one tree slot.
#[derive(Clone, Debug)]
pub struct TrainingParameters {
    pub replace: bool,
    /// One global fraction, or one per response class (stratified).
    pub sample_fraction: Vec<f64>,
    /// Candidate predictors drawn per node; 0 requests the default
    /// `max(1, floor(sqrt(n_col)))`.
    pub n_try: usize,
    /// Sorted predictor keys that join every candidate draw.
    pub draw_always_predictor_keys: Vec<usize>,
    /// Optional per-predictor draw weights; zero excludes a predictor.
    pub draw_predictor_weights: Vec<f64>,
    /// Optional per-class weights for the Gini score (classification).
    pub response_weights: Vec<f64>,
    pub split_rule: SplitRule,
    /// Signed: MAXSTAT uses `-alpha` and scores splits by `-p`.
    pub min_metric_decrease: f64,
    /// 0 means unlimited depth.
    pub max_depth: usize,
    /// Nodes with at most this many samples become leaves; 0 requests
    /// the family default (2 classification, 5 regression).
    pub min_split_n_sample: usize,
    /// Minimum samples on each side of a split; 0 requests 1.
    pub min_leaf_n_sample: usize,
    /// Random thresholds per candidate predictor (EXTRATREES).
    pub n_random_split: usize,
    /// Smallest admissible left-hand proportion (MAXSTAT).
    pub min_prop: f64,
}

impl TrainingParameters {
    /// Family defaults with the LOGRANK rule. `n_try` stays 0 here and
    /// is resolved against the data at the train boundary.
    pub fn defaults_for(family: TreeFamily) -> TrainingParameters {
        TrainingParameters {
            replace: true,
            // Filled by resolve_defaults: 1.0 with replacement, 0.632
            // without.
            sample_fraction: Vec::new(),
            n_try: 0,
            draw_always_predictor_keys: Vec::new(),
            draw_predictor_weights: Vec::new(),
            response_weights: Vec::new(),
            split_rule: SplitRule::Logrank,
            min_metric_decrease: 0.0,
            max_depth: 0,
            min_split_n_sample: match family {
                TreeFamily::Classification => 2,
                TreeFamily::Regression => 5,
            },
            min_leaf_n_sample: 1,
            n_random_split: 1,
            min_prop: 0.1,
        }
    }

    /// Resolve the zero-means-default fields against a concrete data set
    /// and family.
    pub fn resolve_defaults(&mut self, family: TreeFamily, n_col: usize) {
        if self.n_try == 0 {
            self.n_try = ((n_col as f64).sqrt().floor() as usize).max(1);
        }
        if self.min_split_n_sample == 0 {
            self.min_split_n_sample = match family {
                TreeFamily::Classification => 2,
                TreeFamily::Regression => 5,
            };
        }
        if self.min_leaf_n_sample == 0 {
            self.min_leaf_n_sample = 1;
        }
        if self.sample_fraction.is_empty() {
            self.sample_fraction = vec![if self.replace { 1.0 } else { 0.632 }];
        }
        if self.split_rule == SplitRule::Beta && self.min_metric_decrease == 0.0 {
            self.min_metric_decrease = f64::NEG_INFINITY;
        }
        if self.split_rule == SplitRule::Maxstat && self.min_metric_decrease == 0.0 {
            self.min_metric_decrease = -DEFAULT_MAXSTAT_ALPHA;
        }
    }
}

/// Validate a resolved parameter bundle against the training data.
/// Assumes the response index (and so `n_response_value`) is built for
/// classification.
pub fn validate(
    params: &TrainingParameters,
    family: TreeFamily,
    data: &Data,
    case_weights: &[f64],
    is_ordered: &[bool],
) -> Result<()> {
    let n_col = data.n_col();
    let n_row = data.n_row();

    if params.n_try == 0 || params.n_try > n_col {
        return Err(Error::invalid(format!(
            "n_try {} must lie in [1, {}]",
            params.n_try, n_col
        )));
    }

    if params.split_rule == SplitRule::Extratrees && params.n_random_split == 0 {
        return Err(Error::invalid(
            "extratrees requires at least one random split per candidate",
        ));
    }

    match (family, params.split_rule) {
        (TreeFamily::Classification, SplitRule::Beta)
        | (TreeFamily::Classification, SplitRule::Maxstat) => {
            return Err(Error::invalid(format!(
                "split rule {:?} does not apply to classification",
                params.split_rule
            )));
        }
        (TreeFamily::Regression, SplitRule::Hellinger) => {
            return Err(Error::invalid(
                "split rule Hellinger does not apply to regression",
            ));
        }
        _ => {}
    }

    if params.split_rule == SplitRule::Hellinger && data.n_response_value() != 2 {
        return Err(Error::domain(format!(
            "hellinger requires a binary response; found {} classes",
            data.n_response_value()
        )));
    }

    if family == TreeFamily::Regression && params.split_rule == SplitRule::Beta {
        for row in 0..n_row {
            let y = data.get_y(row, 0);
            if !(y > 0.0 && y < 1.0) {
                return Err(Error::domain(format!(
                    "beta rule requires responses in (0, 1); row {} has {}",
                    row, y
                )));
            }
        }
    }

    if params
        .sample_fraction
        .iter()
        .any(|&f| !(0.0..=1.0).contains(&f))
    {
        return Err(Error::invalid("sample_fraction out of range [0, 1]"));
    }

    let total_fraction: f64 = params.sample_fraction.iter().sum();
    if (n_row as f64 * total_fraction).round() < 1.0 {
        return Err(Error::invalid("sample_fraction results in zero samples"));
    }

    if params.sample_fraction.len() > 1 {
        if family != TreeFamily::Classification {
            return Err(Error::invalid(
                "class-wise sample fractions require a classification response",
            ));
        }
        if params.sample_fraction.len() != data.n_response_value() {
            return Err(Error::invalid(format!(
                "{} sample fractions for {} response classes",
                params.sample_fraction.len(),
                data.n_response_value()
            )));
        }
        if !case_weights.is_empty() {
            return Err(Error::invalid(
                "Combination of 'case_weights' argument and class-wise sampling not supported.",
            ));
        }
    }

    if !case_weights.is_empty() {
        if case_weights.len() != n_row {
            return Err(Error::invalid(format!(
                "case_weights length {} does not match {} rows",
                case_weights.len(),
                n_row
            )));
        }
        if case_weights.iter().any(|&w| w < 0.0) {
            return Err(Error::domain("case weight below zero"));
        }
    }

    if !params.draw_predictor_weights.is_empty() {
        if params.draw_predictor_weights.len() != n_col {
            return Err(Error::invalid(format!(
                "draw_predictor_weights length {} does not match {} predictors",
                params.draw_predictor_weights.len(),
                n_col
            )));
        }
        if params.draw_predictor_weights.iter().any(|&w| w < 0.0) {
            return Err(Error::domain("draw predictor weight below zero"));
        }
        let any_positive = params
            .draw_predictor_weights
            .iter()
            .enumerate()
            .any(|(key, &w)| w > 0.0 && !params.draw_always_predictor_keys.contains(&key));
        if !any_positive {
            return Err(Error::invalid(
                "draw_predictor_weights leave no drawable predictor",
            ));
        }
    }

    if params
        .draw_always_predictor_keys
        .iter()
        .any(|&key| key >= n_col)
    {
        return Err(Error::OutOfRange(
            "always-draw predictor key beyond the last column".to_string(),
        ));
    }

    if !params.response_weights.is_empty()
        && params.response_weights.len() != data.n_response_value()
    {
        return Err(Error::invalid(format!(
            "{} response weights for {} classes",
            params.response_weights.len(),
            data.n_response_value()
        )));
    }

    if is_ordered.len() != n_col {
        return Err(Error::invalid(format!(
            "is_ordered length {} does not match {} predictors",
            is_ordered.len(),
            n_col
        )));
    }

    let has_unordered = is_ordered.iter().any(|&o| !o);
    if has_unordered {
        if matches!(params.split_rule, SplitRule::Maxstat | SplitRule::Beta) {
            return Err(Error::invalid(format!(
                "split rule {:?} does not support unordered partition predictors",
                params.split_rule
            )));
        }
        for (col, &ordered) in is_ordered.iter().enumerate() {
            if ordered {
                continue;
            }
            for row in 0..n_row {
                let x = data.get_x(row, col, false);
                if x < 1.0 || x > 64.0 || x.fract() != 0.0 {
                    return Err(Error::invalid(format!(
                        "unordered predictor {} carries level code {} outside 1..=64",
                        col, x
                    )));
                }
            }
        }
    }

    if params.split_rule == SplitRule::Maxstat && !(0.0..0.5).contains(&params.min_prop) {
        return Err(Error::invalid("min_prop must lie in [0, 0.5)"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_classification_data() -> Data {
        let mut data = Data::dense(
            vec![1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 2.0, 2.0],
            4,
            2,
            vec![0.0, 0.0, 1.0, 1.0],
        )
        .unwrap();
        let values = data.response_values_in_appearance_order();
        data.new_response_index(&values).unwrap();
        data
    }

    #[test]
    fn defaults_resolve_against_data() {
        let mut params = TrainingParameters::defaults_for(TreeFamily::Classification);
        params.resolve_defaults(TreeFamily::Classification, 9);
        assert_eq!(params.n_try, 3);
        assert_eq!(params.min_split_n_sample, 2);
        assert_eq!(params.min_leaf_n_sample, 1);

        let mut params = TrainingParameters::defaults_for(TreeFamily::Regression);
        params.replace = false;
        params.sample_fraction = Vec::new();
        params.split_rule = SplitRule::Maxstat;
        params.resolve_defaults(TreeFamily::Regression, 4);
        assert_eq!(params.min_split_n_sample, 5);
        assert_eq!(params.sample_fraction, vec![0.632]);
        assert_eq!(params.min_metric_decrease, -DEFAULT_MAXSTAT_ALPHA);
    }

    #[test]
    fn stratified_with_case_weights_is_rejected() {
        let data = toy_classification_data();
        let mut params = TrainingParameters::defaults_for(TreeFamily::Classification);
        params.sample_fraction = vec![0.4, 0.6];
        params.resolve_defaults(TreeFamily::Classification, 2);
        let err = validate(
            &params,
            TreeFamily::Classification,
            &data,
            &[1.0, 1.0, 1.0, 1.0],
            &[true, true],
        )
        .unwrap_err();
        match err {
            Error::InvalidArgument(message) => assert_eq!(
                message,
                "Combination of 'case_weights' argument and class-wise sampling not supported."
            ),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn zero_sample_fraction_is_rejected() {
        let data = toy_classification_data();
        let mut params = TrainingParameters::defaults_for(TreeFamily::Classification);
        params.sample_fraction = vec![0.0, 0.0];
        params.resolve_defaults(TreeFamily::Classification, 2);
        let err = validate(&params, TreeFamily::Classification, &data, &[], &[true, true])
            .unwrap_err();
        match err {
            Error::InvalidArgument(message) => {
                assert!(message.contains("results in zero samples"))
            }
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn all_zero_draw_weights_rejected() {
        let data = toy_classification_data();
        let mut params = TrainingParameters::defaults_for(TreeFamily::Classification);
        params.draw_predictor_weights = vec![0.0, 0.0];
        params.resolve_defaults(TreeFamily::Classification, 2);
        assert!(matches!(
            validate(&params, TreeFamily::Classification, &data, &[], &[true, true]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rule_family_mismatch_rejected() {
        let data = toy_classification_data();
        let mut params = TrainingParameters::defaults_for(TreeFamily::Classification);
        params.split_rule = SplitRule::Maxstat;
        params.resolve_defaults(TreeFamily::Classification, 2);
        assert!(matches!(
            validate(&params, TreeFamily::Classification, &data, &[], &[true, true]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn canonical_strings_round_trip() {
        assert_eq!(
            SplitRule::Logrank.canonical_str(TreeFamily::Classification),
            "gini"
        );
        assert_eq!(
            SplitRule::Logrank.canonical_str(TreeFamily::Regression),
            "variance"
        );
        assert_eq!(SplitRule::parse("variance").unwrap(), SplitRule::Logrank);
        assert_eq!(SplitRule::parse("maxstat").unwrap(), SplitRule::Maxstat);
        assert!(SplitRule::parse("entropy").is_err());
        assert_eq!(TreeFamily::parse("regression").unwrap(), TreeFamily::Regression);
        assert!(PredictionMode::parse("terminal").is_err());
    }
}

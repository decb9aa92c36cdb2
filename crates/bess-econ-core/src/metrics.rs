use std::collections::BTreeMap;
use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::cashflow::build_cash_flows;
use crate::error::BessEconError;
use crate::project::Project;
use crate::types::{with_metadata, CashFlowSeries, ComputationOutput, Money, Multiple, Rate, Years};
use crate::BessEconResult;

/// IRR root search bounds: -99% through 1000% annual return.
const IRR_GRID_LOW: Decimal = dec!(-0.99);
const IRR_GRID_HIGH: Decimal = dec!(10);
const IRR_GRID_STEP: Decimal = dec!(0.01);
const IRR_RATE_TOLERANCE: Decimal = dec!(0.000000001);
const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Breakeven CapEx search resolution in $/kWh.
const BREAKEVEN_TOLERANCE: Decimal = dec!(0.001);
const BREAKEVEN_CAPEX_CEILING: Decimal = dec!(100000);

/// Net present value of a flow series indexed by year (element 0 is
/// year 0 and is not discounted).
pub fn npv(rate: Rate, flows: &[Money]) -> BessEconResult<Money> {
    if rate <= dec!(-1) {
        return Err(BessEconError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    let base = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    let mut total = Decimal::ZERO;
    for (t, flow) in flows.iter().enumerate() {
        if t > 0 {
            factor *= base;
        }
        total += flow / factor;
    }
    Ok(total)
}

/// NPV with checked arithmetic. Returns None where the discount factor
/// overflows or underflows Decimal range, which happens at the extreme
/// rates the IRR grid scan probes.
fn try_npv(rate: Rate, flows: &[Money]) -> Option<Money> {
    let base = Decimal::ONE.checked_add(rate)?;
    if base <= Decimal::ZERO {
        return None;
    }
    let mut factor = Decimal::ONE;
    let mut total = Decimal::ZERO;
    for (t, flow) in flows.iter().enumerate() {
        if t > 0 {
            factor = factor.checked_mul(base)?;
            if factor.is_zero() {
                return None;
            }
        }
        total = total.checked_add(flow.checked_div(factor)?)?;
    }
    Some(total)
}

/// Internal rate of return for a net flow series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IrrSolution {
    /// The smallest positive discounting rate at which the NPV of the
    /// series is zero, or None when no positive root exists.
    pub rate: Option<Rate>,
    /// Set when the series crosses zero NPV at more than one rate
    /// (possible with sign changes after year 0, e.g. augmentation or
    /// decommissioning outflows). The reported rate is then only one of
    /// several mathematically valid answers.
    pub multiple_roots: bool,
}

/// Find the IRR by grid-scanning for sign changes and bisecting each
/// bracket. Returns the smallest positive root; a series with net flows
/// all of one sign has no root and yields `rate: None`.
pub fn irr(flows: &[Money]) -> BessEconResult<IrrSolution> {
    if flows.len() < 2 {
        return Err(BessEconError::InsufficientData(
            "IRR requires at least two cash flows".into(),
        ));
    }
    let has_positive = flows.iter().any(|f| *f > Decimal::ZERO);
    let has_negative = flows.iter().any(|f| *f < Decimal::ZERO);
    if !has_positive || !has_negative {
        return Ok(IrrSolution {
            rate: None,
            multiple_roots: false,
        });
    }

    // Scan for sign-change brackets. Grid points where the NPV is not
    // representable are skipped and the running bracket is reset.
    let mut brackets: Vec<(Rate, Rate)> = Vec::new();
    let mut prev: Option<(Rate, Money)> = None;
    let mut rate = IRR_GRID_LOW;
    while rate <= IRR_GRID_HIGH {
        match try_npv(rate, flows) {
            Some(value) => {
                if value.is_zero() {
                    // Exact root at a grid point; bracket it once.
                    let lo = prev.map(|(r, _)| r).unwrap_or(rate);
                    brackets.push((lo, rate));
                } else if let Some((prev_rate, prev_value)) = prev {
                    if !prev_value.is_zero()
                        && (prev_value > Decimal::ZERO) != (value > Decimal::ZERO)
                    {
                        brackets.push((prev_rate, rate));
                    }
                }
                prev = Some((rate, value));
            }
            None => prev = None,
        }
        rate += IRR_GRID_STEP;
    }

    if brackets.is_empty() {
        return Ok(IrrSolution {
            rate: None,
            multiple_roots: false,
        });
    }

    let multiple_roots = brackets.len() > 1;
    // Brackets come out in ascending rate order; the first refined root
    // above zero is the answer.
    for (lo, hi) in brackets {
        let root = bisect_irr(flows, lo, hi)?;
        if root > Decimal::ZERO {
            return Ok(IrrSolution {
                rate: Some(root),
                multiple_roots,
            });
        }
    }
    Ok(IrrSolution {
        rate: None,
        multiple_roots,
    })
}

fn bisect_irr(flows: &[Money], mut lo: Rate, mut hi: Rate) -> BessEconResult<Rate> {
    let two = dec!(2);
    let mut lo_value = try_npv(lo, flows).ok_or_else(|| irr_failure(0, hi - lo))?;
    for iteration in 0..MAX_BISECTION_ITERATIONS {
        let mid = (lo + hi) / two;
        let mid_value = try_npv(mid, flows).ok_or_else(|| irr_failure(iteration, hi - lo))?;
        if mid_value.is_zero() || hi - lo < IRR_RATE_TOLERANCE {
            return Ok(mid);
        }
        if (lo_value > Decimal::ZERO) == (mid_value > Decimal::ZERO) {
            lo = mid;
            lo_value = mid_value;
        } else {
            hi = mid;
        }
    }
    Err(irr_failure(MAX_BISECTION_ITERATIONS, hi - lo))
}

fn irr_failure(iterations: u32, last_delta: Decimal) -> BessEconError {
    BessEconError::ConvergenceFailure {
        function: "irr".into(),
        iterations,
        last_delta,
    }
}

/// Benefit-cost ratio: PV of benefit flows over PV of cost flows.
///
/// Must be fed the decomposed benefit and cost columns, never the net
/// flows; mixed-sign net flows make the ratio meaningless.
pub fn benefit_cost_ratio(
    rate: Rate,
    benefit_flows: &[Money],
    cost_flows: &[Money],
) -> BessEconResult<Multiple> {
    let pv_benefits = npv(rate, benefit_flows)?;
    let pv_costs = npv(rate, cost_flows)?;
    if pv_costs <= Decimal::ZERO {
        return Err(BessEconError::DivisionByZero {
            context: "Benefit-cost ratio with zero present value of costs".into(),
        });
    }
    Ok(pv_benefits / pv_costs)
}

/// Levelized cost of storage in $/MWh: PV of all costs over PV of
/// energy discharged, with energy discounted at the same rate as money.
pub fn lcos(rate: Rate, cost_flows: &[Money], energy_mwh: &[Money]) -> BessEconResult<Money> {
    let pv_costs = npv(rate, cost_flows)?;
    let pv_energy = npv(rate, energy_mwh)?;
    if pv_energy <= Decimal::ZERO {
        return Err(BessEconError::DivisionByZero {
            context: "LCOS with zero discounted energy throughput".into(),
        });
    }
    Ok(pv_costs / pv_energy)
}

/// Simple (undiscounted) payback period with linear interpolation within
/// the recovery year. None when cumulative net flow never turns
/// non-negative; zero when there is no initial outflow to recover.
pub fn payback_period(net_flows: &[Money]) -> Option<Years> {
    let first = *net_flows.first()?;
    if first >= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    let mut cumulative = first;
    for (t, flow) in net_flows.iter().enumerate().skip(1) {
        let before = cumulative;
        cumulative += flow;
        if cumulative >= Decimal::ZERO {
            let year = Decimal::from(t as u64);
            if flow.is_zero() {
                return Some(year);
            }
            return Some(year - Decimal::ONE + (-before / flow));
        }
    }
    None
}

/// The battery CapEx ($/kWh) at which the project's benefit-cost ratio
/// equals exactly 1, holding every other input fixed.
///
/// Searches by bisection on a full model rebuild per probe, since CapEx
/// feeds the ITC, insurance and property tax lines as well as year 0.
/// None when the project cannot break even at any CapEx (BCR at zero
/// CapEx is still at or below 1) or when no finite ceiling bounds the
/// breakeven.
pub fn breakeven_capex(project: &Project) -> BessEconResult<Option<Money>> {
    let bcr_at = |capex: Money| -> BessEconResult<Multiple> {
        let mut probe = project.clone();
        probe.costs.capex_per_kwh = capex;
        let series = build_cash_flows(&probe)?;
        benefit_cost_ratio(
            probe.basics.discount_rate,
            &series.benefit_flows(),
            &series.cost_flows(),
        )
    };

    if bcr_at(Decimal::ZERO)? <= Decimal::ONE {
        return Ok(None);
    }

    // BCR falls monotonically as CapEx rises, so grow the upper bound
    // until the ratio drops below 1.
    let mut lo = Decimal::ZERO;
    let mut hi = (project.costs.capex_per_kwh * dec!(4)).max(dec!(1000));
    while bcr_at(hi)? > Decimal::ONE {
        hi *= dec!(2);
        if hi > BREAKEVEN_CAPEX_CEILING {
            return Ok(None);
        }
    }

    let two = dec!(2);
    while hi - lo > BREAKEVEN_TOLERANCE {
        let mid = (lo + hi) / two;
        if bcr_at(mid)? > Decimal::ONE {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(Some((lo + hi) / two))
}

/// Complete financial metric set for a project, alongside the cash flow
/// series the metrics were derived from.
///
/// Metrics that are mathematically undefined for the given flows are
/// None rather than errors; the accompanying warnings explain which and
/// why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialResults {
    pub pv_benefits: Money,
    pub pv_costs: Money,
    pub npv: Money,
    pub bcr: Option<Multiple>,
    pub irr: Option<Rate>,
    pub irr_multiple_roots: bool,
    pub payback_years: Option<Years>,
    pub lcos_per_mwh: Option<Money>,
    pub breakeven_capex_per_kwh: Option<Money>,
    /// Each benefit stream's share of total PV benefits, keyed by
    /// stream name.
    pub benefit_breakdown: BTreeMap<String, Rate>,
    pub series: CashFlowSeries,
}

/// Run the full analysis: build the cash flow model, then derive every
/// financial metric from it.
pub fn analyze_project(project: &Project) -> BessEconResult<ComputationOutput<FinancialResults>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let series = build_cash_flows(project)?;
    let rate = project.basics.discount_rate;

    let benefit_flows = series.benefit_flows();
    let cost_flows = series.cost_flows();
    let net_flows = series.net_flows();

    let pv_benefits = npv(rate, &benefit_flows)?;
    let pv_costs = npv(rate, &cost_flows)?;
    let npv_value = pv_benefits - pv_costs;

    let bcr = match benefit_cost_ratio(rate, &benefit_flows, &cost_flows) {
        Ok(value) => Some(value),
        Err(BessEconError::DivisionByZero { .. }) => {
            warnings.push("BCR undefined: present value of costs is zero".to_string());
            None
        }
        Err(e) => return Err(e),
    };

    let (irr_rate, irr_multiple_roots) = match irr(&net_flows) {
        Ok(solution) => {
            if solution.multiple_roots {
                warnings.push(
                    "Multiple IRR roots detected; reporting the smallest positive root".to_string(),
                );
            }
            (solution.rate, solution.multiple_roots)
        }
        Err(BessEconError::ConvergenceFailure { .. }) => {
            warnings.push("IRR calculation did not converge".to_string());
            (None, false)
        }
        Err(e) => return Err(e),
    };

    let lcos_per_mwh = match lcos(rate, &cost_flows, &series.annual_energy_mwh) {
        Ok(value) => Some(value),
        Err(BessEconError::DivisionByZero { .. }) => {
            warnings.push("LCOS undefined: no discounted energy throughput".to_string());
            None
        }
        Err(e) => return Err(e),
    };

    let payback_years = payback_period(&net_flows);
    if payback_years.is_none() {
        warnings.push("Project never recovers its initial investment".to_string());
    }

    let breakeven = breakeven_capex(project)?;
    if breakeven.is_none() {
        warnings.push("No breakeven CapEx: project does not break even at any battery cost".to_string());
    }

    let mut benefit_breakdown = BTreeMap::new();
    if pv_benefits > Decimal::ZERO {
        for detail in &series.benefit_detail {
            let pv = npv(rate, &detail.values)?;
            benefit_breakdown.insert(detail.name.clone(), pv / pv_benefits);
        }
    }

    let results = FinancialResults {
        pv_benefits,
        pv_costs,
        npv: npv_value,
        bcr,
        irr: irr_rate,
        irr_multiple_roots,
        payback_years,
        lcos_per_mwh,
        breakeven_capex_per_kwh: breakeven,
        benefit_breakdown,
        series,
    };

    Ok(with_metadata(
        "Discounted cash flow analysis: NPV, IRR (grid scan + bisection), \
         benefit-cost ratio, LCOS, simple payback, and breakeven CapEx search",
        project,
        warnings,
        start.elapsed().as_micros() as u64,
        results,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::BenefitStream;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_npv_zero_rate_is_sum() {
        // rate of zero is rejected by project validation but fine here
        let flows = vec![dec!(-100), dec!(60), dec!(60)];
        assert_eq!(npv(Decimal::ZERO, &flows).unwrap(), dec!(20));
    }

    #[test]
    fn test_npv_known_value() {
        let flows = vec![dec!(-100), dec!(110)];
        // -100 + 110/1.10 = 0
        assert_eq!(npv(dec!(0.10), &flows).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_npv_rejects_rate_at_or_below_minus_one() {
        assert!(npv(dec!(-1), &[dec!(1)]).is_err());
        assert!(npv(dec!(-1.5), &[dec!(1)]).is_err());
    }

    #[test]
    fn test_try_npv_survives_extreme_rates() {
        let mut flows = vec![dec!(-57_300_000)];
        flows.extend(std::iter::repeat(dec!(30_000_000)).take(20));
        // Near the grid extremes the discount factor over/underflows
        // instead of panicking.
        let _ = try_npv(dec!(-0.99), &flows);
        let _ = try_npv(dec!(10), &flows);
    }

    #[test]
    fn test_irr_single_root() {
        let flows = vec![dec!(-100), dec!(110)];
        let solution = irr(&flows).unwrap();
        let rate = solution.rate.unwrap();
        assert!((rate - dec!(0.10)).abs() < dec!(0.0001), "got {rate}");
        assert!(!solution.multiple_roots);
    }

    #[test]
    fn test_irr_undefined_for_one_signed_flows() {
        let solution = irr(&[dec!(-100), dec!(-50), dec!(-25)]).unwrap();
        assert_eq!(solution.rate, None);
        assert!(!solution.multiple_roots);

        let solution = irr(&[dec!(100), dec!(50)]).unwrap();
        assert_eq!(solution.rate, None);
    }

    #[test]
    fn test_irr_multiple_roots_flagged() {
        // -100 + 230/(1+r) - 132/(1+r)^2 has roots at exactly 10% and 20%.
        let flows = vec![dec!(-100), dec!(230), dec!(-132)];
        let solution = irr(&flows).unwrap();
        assert!(solution.multiple_roots);
        let rate = solution.rate.unwrap();
        // The smaller root is the one reported.
        assert!((rate - dec!(0.10)).abs() < dec!(0.001), "got {rate}");
    }

    #[test]
    fn test_irr_requires_two_flows() {
        assert!(matches!(
            irr(&[dec!(-100)]),
            Err(BessEconError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_bcr_division_by_zero() {
        let result = benefit_cost_ratio(dec!(0.07), &[Decimal::ZERO, dec!(10)], &[Decimal::ZERO; 2]);
        assert!(matches!(result, Err(BessEconError::DivisionByZero { .. })));
    }

    #[test]
    fn test_bcr_known_value() {
        let benefits = vec![Decimal::ZERO, dec!(110)];
        let costs = vec![dec!(50), Decimal::ZERO];
        // PV benefits = 100 at 10%, PV costs = 50
        let bcr = benefit_cost_ratio(dec!(0.10), &benefits, &costs).unwrap();
        assert_eq!(bcr, dec!(2));
    }

    #[test]
    fn test_payback_interpolated() {
        let flows = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        assert_eq!(payback_period(&flows), Some(dec!(2.5)));
    }

    #[test]
    fn test_payback_exact_year_boundary() {
        let flows = vec![dec!(-800), dec!(400), dec!(400)];
        assert_eq!(payback_period(&flows), Some(dec!(2)));
    }

    #[test]
    fn test_payback_no_initial_outflow() {
        assert_eq!(payback_period(&[dec!(10), dec!(5)]), Some(Decimal::ZERO));
    }

    #[test]
    fn test_payback_never_recovered() {
        assert_eq!(payback_period(&[dec!(-1000), dec!(10), dec!(10)]), None);
    }

    #[test]
    fn test_lcos_simple() {
        let costs = vec![dec!(1000), Decimal::ZERO];
        let energy = vec![Decimal::ZERO, dec!(110)];
        // PV energy at 10% = 100 MWh, PV costs = 1000 -> $10/MWh
        assert_eq!(lcos(dec!(0.10), &costs, &energy).unwrap(), dec!(10));
    }

    #[test]
    fn test_lcos_zero_energy_is_error() {
        let result = lcos(dec!(0.07), &[dec!(100)], &[Decimal::ZERO]);
        assert!(matches!(result, Err(BessEconError::DivisionByZero { .. })));
    }

    fn funded_project() -> Project {
        let mut project = Project::default();
        project.benefits.streams = vec![
            BenefitStream::resource_adequacy(dec!(12_000_000), dec!(0.02)),
            BenefitStream::energy_arbitrage(dec!(9_300_000), dec!(0.02)),
            BenefitStream::ancillary_services(dec!(3_000_000), dec!(0.02)),
            BenefitStream::td_deferral(dec!(2_500_000), dec!(0.02)),
            BenefitStream::resilience(dec!(2_000_000), dec!(0.02)),
            BenefitStream::renewable_integration(dec!(2_500_000), dec!(0.02)),
            BenefitStream::ghg_value(dec!(1_000_000), dec!(0.02)),
            BenefitStream::voltage_support(dec!(500_000), dec!(0.02)),
        ];
        project
    }

    #[test]
    fn test_breakeven_capex_closes_bcr_gap() {
        let project = funded_project();
        let breakeven = breakeven_capex(&project).unwrap().unwrap();
        // A profitable project breaks even above its actual CapEx.
        assert!(breakeven > project.costs.capex_per_kwh);

        let mut at_breakeven = project.clone();
        at_breakeven.costs.capex_per_kwh = breakeven;
        let series = build_cash_flows(&at_breakeven).unwrap();
        let bcr = benefit_cost_ratio(
            at_breakeven.basics.discount_rate,
            &series.benefit_flows(),
            &series.cost_flows(),
        )
        .unwrap();
        assert!((bcr - Decimal::ONE).abs() < dec!(0.001), "BCR at breakeven: {bcr}");
    }

    #[test]
    fn test_breakeven_none_for_unfundable_project() {
        let mut project = funded_project();
        // Strip the benefits; no CapEx makes this break even.
        project.benefits.streams.clear();
        assert_eq!(breakeven_capex(&project).unwrap(), None);
    }

    #[test]
    fn test_analyze_reference_project() {
        let output = analyze_project(&funded_project()).unwrap();
        let r = &output.result;

        assert!(r.npv > dec!(50_000_000), "NPV: {}", r.npv);
        let bcr = r.bcr.unwrap();
        assert!(bcr > dec!(1.5) && bcr < dec!(6), "BCR: {bcr}");
        let irr = r.irr.unwrap();
        assert!(irr > dec!(0.2) && irr < dec!(1), "IRR: {irr}");
        let payback = r.payback_years.unwrap();
        assert!(payback > Decimal::ONE && payback < dec!(4), "payback: {payback}");
        let lcos = r.lcos_per_mwh.unwrap();
        assert!(lcos > dec!(30) && lcos < dec!(300), "LCOS: {lcos}");
        assert!(r.breakeven_capex_per_kwh.unwrap() > dec!(160));

        // Breakdown shares sum to 1 within rounding.
        let share_sum: Decimal = r.benefit_breakdown.values().copied().sum();
        assert!((share_sum - Decimal::ONE).abs() < dec!(0.0001), "shares: {share_sum}");
        assert_eq!(r.benefit_breakdown.len(), 8);

        assert_eq!(r.series.flows.len(), 21);
        assert_eq!(output.metadata.precision, "rust_decimal_128bit");
    }

    #[test]
    fn test_analyze_warns_instead_of_failing_on_undefined_metrics() {
        let mut project = Project::default();
        project.benefits.streams.clear();
        let output = analyze_project(&project).unwrap();
        assert_eq!(output.result.irr, None);
        assert_eq!(output.result.payback_years, None);
        assert_eq!(output.result.breakeven_capex_per_kwh, None);
        assert!(!output.warnings.is_empty());
    }
}

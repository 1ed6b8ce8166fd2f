//! Formatted terminal output.
//!
//! Formatting lives in one place so the estimation code stays free of
//! presentation concerns and output changes stay localized.

use crate::domain::{RecessionIndicator, RegimeModel};
use crate::report::comparison::RecessionComparison;

/// Fit summary: data, convergence, information criteria, per-regime
/// parameters and the transition matrix.
pub fn format_fit_summary(model: &RegimeModel) -> String {
    let mut out = String::new();
    let endog = model.endog();

    out.push_str("=== rr - Markov-switching recession regimes ===\n");
    out.push_str(&format!("Endog: {}\n", endog.name()));
    if let Some(exog) = model.exog() {
        out.push_str(&format!("Exog : {}\n", exog.name()));
    }
    if let (Some(first), Some(last)) = (endog.first_date(), endog.last_date()) {
        out.push_str(&format!("Sample: {first} .. {last} (n={})\n", model.n_obs()));
    }
    out.push_str(&format!(
        "Model: k={} | trend={} | switching variance={}\n",
        model.k_regimes(),
        if model.trend().has_intercept() { "c" } else { "n" },
        if model.switching_variance() { "yes" } else { "no" },
    ));
    out.push_str(&format!(
        "Status: {} after {} iteration(s)\n",
        model.status(),
        model.iterations()
    ));
    out.push_str(&format!(
        "Log-likelihood={:.4} AIC={:.4} BIC={:.4} HQIC={:.4}\n",
        model.log_likelihood(),
        model.aic(),
        model.bic(),
        model.hqic()
    ));

    out.push_str("\nRegimes:\n");
    out.push_str(
        format!(
            "{:<14} {:>12} {:>12} {:>12} {:>12}\n",
            "regime", "const", "exog", "sigma2", "duration"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<14} {:-<12} {:-<12} {:-<12} {:-<12}", "", "", "", "", "").trim_end());
    out.push('\n');

    let durations = model.expected_durations();
    for (j, p) in model.params().iter().enumerate() {
        out.push_str(
            format!(
                "{:<14} {:>12} {:>12} {:>12.6} {:>12}\n",
                truncate(&format!("{j} {}", model.regime_label(j)), 14),
                fmt_opt(p.intercept),
                fmt_opt(p.exog_coef),
                p.variance,
                fmt_duration(durations[j]),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out.push_str("\nTransition matrix P[i -> j]:\n");
    for (i, row) in model.transition().iter().enumerate() {
        out.push_str(&format!("  {i}: {}\n", fmt_vec(row)));
    }

    out
}

/// Recession comparison block.
pub fn format_comparison(cmp: &RecessionComparison, recession: &RecessionIndicator) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Recession comparison ({}, contraction if P >= {:.2}):\n",
        recession.series().name(),
        cmp.threshold
    ));
    out.push_str(&format!(
        "  dates={} recession dates={} accuracy={}\n",
        cmp.n,
        cmp.recession_dates(),
        cmp.accuracy().map(|a| format!("{:.1}%", a * 100.0)).unwrap_or_else(|| "n/a".to_string())
    ));
    out.push_str(&format!(
        "  hits={} misses={} false alarms={} correct rejections={}\n",
        cmp.true_positive, cmp.false_negative, cmp.false_positive, cmp.true_negative
    ));
    out.push_str(&format!(
        "  mean P(contraction): in recession={} outside={}\n",
        fmt_prob(cmp.mean_prob_in_recession),
        fmt_prob(cmp.mean_prob_outside)
    ));
    out.push_str(&format!("  recession spells: {}\n", recession.spells().len()));
    out
}

/// The last `n` dates with each regime's smoothed probability.
pub fn format_tail(model: &RegimeModel, recession: Option<&RecessionIndicator>, n: usize) -> String {
    let mut out = String::new();
    if n == 0 || model.n_obs() == 0 {
        return out;
    }
    let k = model.k_regimes();

    let mut header = format!("{:<10} {:>10}", "date", "endog");
    for j in 0..k {
        header.push_str(&format!(" {:>8}", format!("P({j})")));
    }
    if recession.is_some() {
        header.push_str(&format!(" {:>4}", "rec"));
    }
    out.push_str(header.trim_end());
    out.push('\n');

    let start = model.n_obs().saturating_sub(n);
    let rows = model.smoothed_rows();
    for (t, (date, y)) in model.endog().iter().enumerate().skip(start) {
        let mut line = format!("{:<10} {:>10.4}", date.to_string(), y);
        for p in &rows[t] {
            line.push_str(&format!(" {p:>8.4}"));
        }
        if let Some(rec) = recession {
            let flag = match rec.in_recession(date) {
                Some(true) => "1",
                Some(false) => "0",
                None => "",
            };
            line.push_str(&format!(" {flag:>4}"));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_prob(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "n/a".to_string())
}

fn fmt_duration(d: f64) -> String {
    if d.is_finite() { format!("{d:.2}") } else { "inf".to_string() }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

//! Rendering results as Markdown.
//!
//! The report has three sections: deployment cost, mint cost per batch size and transfer cost per token index, the
//! latter split into one table per scenario. Rows are contract variants (in suite order, mock suffix stripped) and
//! columns are the swept parameters. Missing measurements are shown as `-`.
//!
//! # Examples
//!
//! ```
//! use gas_bench::{
//!     report::render,
//!     results::{Operation, Results},
//!     suite::{Suite, Variant},
//! };
//!
//! let suite = Suite {
//!     variants: vec![Variant::new("A")],
//!     mint_amounts: vec![1],
//!     scenarios: vec![],
//!     compiler: Default::default(),
//! };
//! let mut results = Results::default();
//! results.record(&"A".into(), Operation::Deploy, 100_000).unwrap();
//! results.record(&"A".into(), Operation::Mint(1), 50_000).unwrap();
//!
//! let report = render(&suite, &results);
//! assert!(report.contains("| A | 100,000 |"));
//! assert!(report.contains("| Contract | Mint 1 |\n| --- | --- |\n| A | 50,000 |"));
//! ```

use crate::{
    results::{Operation, Results},
    suite::{ScenarioSweep, Suite},
};

const MISSING: &str = "-";

/// Renders the full report for a run of `suite`.
#[must_use]
pub fn render(suite: &Suite, results: &Results) -> String {
    let mut report = format!("## Deployment\n\n{}\n\n", deploy_table(suite, results));
    report += &format!("## Mint\n\n{}\n\n", mint_table(suite, results));
    report += "## Transfer\n\n";
    for sweep in &suite.scenarios {
        report += &format!(
            "### {}\n\n{}\n\n",
            sweep.scenario.label(),
            transfer_table(suite, results, sweep)
        );
    }
    report
}

fn table(
    suite: &Suite,
    results: &Results,
    headers: impl IntoIterator<Item = String>,
    operations: &[Operation],
) -> String {
    let mut lines = vec![
        row(std::iter::once("Contract".to_string()).chain(headers)),
        row(std::iter::once("---".to_string())
            .chain(operations.iter().map(|_| "---".to_string()))),
    ];
    for variant in &suite.variants {
        lines.push(row(std::iter::once(variant.name.display_name().to_string()).chain(
            operations.iter().map(|operation| {
                results
                    .get(&variant.name, *operation)
                    .map_or_else(|| MISSING.to_string(), thousands)
            }),
        )));
    }
    lines.join("\n")
}

fn deploy_table(suite: &Suite, results: &Results) -> String {
    table(
        suite,
        results,
        ["Deploy".to_string()],
        &[Operation::Deploy],
    )
}

fn mint_table(suite: &Suite, results: &Results) -> String {
    let operations: Vec<_> = suite
        .mint_amounts
        .iter()
        .map(|amount| Operation::Mint(*amount))
        .collect();
    table(
        suite,
        results,
        suite.mint_amounts.iter().map(|amount| format!("Mint {amount}")),
        &operations,
    )
}

fn transfer_table(suite: &Suite, results: &Results, sweep: &ScenarioSweep) -> String {
    let operations: Vec<_> = sweep
        .token_indices
        .iter()
        .map(|token_index| Operation::Transfer(sweep.scenario, *token_index))
        .collect();
    table(
        suite,
        results,
        sweep
            .token_indices
            .iter()
            .map(|token_index| format!("Token #{token_index}")),
        &operations,
    )
}

fn row(values: impl IntoIterator<Item = String>) -> String {
    format!("| {} |", values.into_iter().collect::<Vec<_>>().join(" | "))
}

/// Formats a number with `,` separating groups of three digits.
///
/// # Examples
///
/// ```
/// use gas_bench::report::thousands;
///
/// assert_eq!(thousands(999), "999");
/// assert_eq!(thousands(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(digit);
    }
    formatted
}

mod common;

use common::fixtures::{CATALOG, REPORT_OUTPUT, REPORT_STYLESHEET};
use common::{TestResult, init_logging};
use rayon::prelude::*;
use std::sync::Arc;
use xsltr::{TransformOptions, Transformer};

#[test]
fn test_repeated_calls_are_deterministic() -> TestResult {
    init_logging();
    let first = xsltr::transform(REPORT_STYLESHEET, CATALOG, false, false, false)?;
    for _ in 0..10 {
        assert_eq!(xsltr::transform(REPORT_STYLESHEET, CATALOG, false, false, false)?, first);
    }
    assert_eq!(first, REPORT_OUTPUT);
    Ok(())
}

#[test]
fn test_shared_transformer_across_rayon_workers() -> TestResult {
    init_logging();
    let options = TransformOptions::default().with_stack_size(16 * 1024 * 1024);
    let transformer = Arc::new(Transformer::compile(REPORT_STYLESHEET, &options)?);
    let outputs: Vec<String> = (0..64)
        .into_par_iter()
        .map(|_| transformer.transform(CATALOG))
        .collect::<Result<_, _>>()?;
    assert!(outputs.iter().all(|out| out == REPORT_OUTPUT));
    Ok(())
}

#[test]
fn test_independent_calls_in_parallel() -> TestResult {
    init_logging();
    let results: Vec<(usize, String)> = (1..=32usize)
        .into_par_iter()
        .map(|n| {
            let xml = format!("<r>{}</r>", "<a/>".repeat(n));
            let options = TransformOptions::default().with_stack_size(16 * 1024 * 1024);
            xsltr::transform_with_options(common::fixtures::COUNT_STYLESHEET, &xml, &options)
                .map(|out| (n, out))
        })
        .collect::<Result<_, _>>()?;
    for (n, out) in results {
        assert_eq!(out, format!("<?xml version=\"1.0\"?>\n<out>{}</out>\n", n));
    }
    Ok(())
}

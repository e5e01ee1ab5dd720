mod common;

use common::{TestResult, init_logging, options_with, stylesheet};
use xsltr::{ErrorKind, InMemoryResourceProvider, TransformError, TransformOptions};

const XI: &str = r#"xmlns:xi="http://www.w3.org/2001/XInclude""#;

/// Reports what the engine saw: included parts, literal include directives and the
/// `kind` attribute the external subset defaults.
fn flag_report_stylesheet() -> String {
    stylesheet(
        r#"method="text""#,
        r#"<xsl:template match="/">
             <xsl:value-of select="count(//part)"/>
             <xsl:text>/</xsl:text>
             <xsl:value-of select="count(//*[local-name() = 'include'])"/>
             <xsl:text>/</xsl:text>
             <xsl:value-of select="doc/@kind"/>
           </xsl:template>"#,
    )
}

fn provider() -> InMemoryResourceProvider {
    InMemoryResourceProvider::new()
        .with("part.xml", "<part>p</part>")
        .with(
            "doc.dtd",
            r#"<!ELEMENT doc (part | xi:include)*>
               <!ATTLIST doc kind CDATA "from-dtd" xmlns:xi CDATA #IMPLIED>
               <!ELEMENT xi:include EMPTY>
               <!ATTLIST xi:include href CDATA #REQUIRED>
               <!ELEMENT part (#PCDATA)>"#,
        )
}

fn source() -> String {
    format!(r#"<!DOCTYPE doc SYSTEM "doc.dtd"><doc {XI}><xi:include href="part.xml"/></doc>"#)
}

fn run_flags(includes: bool, subsets: bool, validate: bool) -> Result<String, TransformError> {
    init_logging();
    let options = TransformOptions {
        process_includes: includes,
        load_external_subsets: subsets,
        validate_xml: validate,
        ..options_with(provider())
    };
    xsltr::transform_with_options(&flag_report_stylesheet(), &source(), &options)
}

#[test]
fn test_all_flags_off() -> TestResult {
    assert_eq!(run_flags(false, false, false)?, "0/1/");
    Ok(())
}

#[test]
fn test_process_includes_alone() -> TestResult {
    assert_eq!(run_flags(true, false, false)?, "1/0/");
    Ok(())
}

#[test]
fn test_load_external_subsets_alone() -> TestResult {
    assert_eq!(run_flags(false, true, false)?, "0/1/from-dtd");
    Ok(())
}

#[test]
fn test_includes_and_subsets_compose() -> TestResult {
    assert_eq!(run_flags(true, true, false)?, "1/0/from-dtd");
    Ok(())
}

#[test]
fn test_validation_of_conforming_document() -> TestResult {
    assert_eq!(run_flags(false, false, true)?, "0/1/from-dtd");
    Ok(())
}

#[test]
fn test_validation_failure_stops_before_transformation() {
    init_logging();
    let options = TransformOptions {
        validate_xml: true,
        ..options_with(InMemoryResourceProvider::new())
    };
    let xml = r#"<!DOCTYPE doc [<!ELEMENT doc (a)><!ELEMENT a EMPTY>]><doc><b/></doc>"#;
    let err = xsltr::transform_with_options(&flag_report_stylesheet(), xml, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let options = TransformOptions {
        validate_xml: false,
        ..options
    };
    assert!(xsltr::transform_with_options(&flag_report_stylesheet(), xml, &options).is_ok());
}

#[test]
fn test_validation_without_doctype_passes() -> TestResult {
    init_logging();
    let options = TransformOptions {
        validate_xml: true,
        ..options_with(InMemoryResourceProvider::new())
    };
    assert_eq!(
        xsltr::transform_with_options(&flag_report_stylesheet(), "<doc/>", &options)?,
        "0/0/"
    );
    Ok(())
}

#[test]
fn test_missing_include_target_is_resource_fetch_error() {
    init_logging();
    let options = TransformOptions {
        process_includes: true,
        ..options_with(InMemoryResourceProvider::new())
    };
    let xml = format!(r#"<doc {XI}><xi:include href="gone.xml"/></doc>"#);
    let err = xsltr::transform_with_options(&flag_report_stylesheet(), &xml, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceFetch);
}

#[test]
fn test_external_subset_is_not_fetched_when_off() -> TestResult {
    init_logging();
    // Nothing to fetch from: the run must not need the subset.
    let options = options_with(InMemoryResourceProvider::new());
    let xml = r#"<!DOCTYPE doc SYSTEM "absent.dtd"><doc/>"#;
    assert_eq!(xsltr::transform_with_options(&flag_report_stylesheet(), xml, &options)?, "0/0/");
    Ok(())
}

#[test]
fn test_plain_source_is_unaffected_by_fetch_flags() -> TestResult {
    init_logging();
    let xml = r#"<!DOCTYPE doc [<!ENTITY who "world">]><doc n="1"><p>hello &who;</p><!--c--><?pi x?></doc>"#;
    let mut outputs = Vec::new();
    for (includes, subsets) in [(false, false), (true, false), (false, true), (true, true)] {
        let options = TransformOptions {
            process_includes: includes,
            load_external_subsets: subsets,
            ..options_with(InMemoryResourceProvider::new())
        };
        outputs.push(xsltr::transform_with_options(
            common::fixtures::IDENTITY_STYLESHEET,
            xml,
            &options,
        )?);
    }
    assert!(outputs[0].contains("<p>hello world</p>"));
    assert!(outputs.iter().all(|out| out == &outputs[0]));
    Ok(())
}

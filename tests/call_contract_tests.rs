mod common;

use common::fixtures::{CATALOG, COUNT_STYLESHEET, REPORT_OUTPUT, REPORT_STYLESHEET};
use common::{TestResult, init_logging, options_with, run, stylesheet};
use xsltr::{ErrorKind, InMemoryResourceProvider, TransformOptions};

#[test]
fn test_count_scenario() -> TestResult {
    init_logging();
    let out = xsltr::transform(COUNT_STYLESHEET, "<r><a/><a/></r>", false, false, false)?;
    assert_eq!(out, "<?xml version=\"1.0\"?>\n<out>2</out>\n");
    Ok(())
}

#[test]
fn test_equal_priority_templates_last_declared_wins() -> TestResult {
    let xslt = stylesheet(
        r#"method="text""#,
        r#"<xsl:template match="item">A</xsl:template>
           <xsl:template match="item">B</xsl:template>"#,
    );
    assert_eq!(run(&xslt, "<r><item/><item/></r>")?, "BB");
    Ok(())
}

#[test]
fn test_report_combines_sort_number_keys_and_formatting() -> TestResult {
    assert_eq!(run(REPORT_STYLESHEET, CATALOG)?, REPORT_OUTPUT);
    Ok(())
}

#[test]
fn test_default_output_is_xml_utf8() -> TestResult {
    let xslt = stylesheet("", r#"<xsl:template match="/"><p>&#233;&#x1F600;</p></xsl:template>"#);
    assert_eq!(run(&xslt, "<r/>")?, "<?xml version=\"1.0\"?>\n<p>\u{e9}\u{1F600}</p>\n");
    Ok(())
}

#[test]
fn test_parameters_from_options() -> TestResult {
    init_logging();
    let xslt = stylesheet(
        r#"method="text""#,
        r#"<xsl:param name="who" select="'nobody'"/>
           <xsl:template match="/">hello <xsl:value-of select="$who"/></xsl:template>"#,
    );
    let options = options_with(InMemoryResourceProvider::new()).with_param("who", "caller");
    assert_eq!(xsltr::transform_with_options(&xslt, "<r/>", &options)?, "hello caller");
    Ok(())
}

#[test]
fn test_compiled_transformer_is_reusable() -> TestResult {
    init_logging();
    let transformer = xsltr::Transformer::compile(COUNT_STYLESHEET, &TransformOptions::default())?;
    for n in 0..5 {
        let xml = format!("<r>{}</r>", "<a/>".repeat(n));
        assert_eq!(
            transformer.transform(&xml)?,
            format!("<?xml version=\"1.0\"?>\n<out>{}</out>\n", n)
        );
    }
    Ok(())
}

#[test]
fn test_internal_subset_entities_are_always_expanded() -> TestResult {
    let xslt = stylesheet(r#"method="text""#, r#"<xsl:template match="/"><xsl:value-of select="doc"/></xsl:template>"#);
    let xml = r#"<!DOCTYPE doc [<!ENTITY who "world">]><doc>hello &who;</doc>"#;
    assert_eq!(run(&xslt, xml)?, "hello world");
    Ok(())
}

mod error_taxonomy_tests {
    use super::*;

    #[test]
    fn test_malformed_source_is_parse_error() {
        let err = run(COUNT_STYLESHEET, "<r><a></r>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("line 1"), "got {}", err);
    }

    #[test]
    fn test_malformed_stylesheet_is_parse_error() {
        let err = run("<xsl:stylesheet", "<r/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("stylesheet"), "got {}", err);
    }

    #[test]
    fn test_bad_pattern_is_compile_error() {
        let xslt = stylesheet("", r#"<xsl:template match="///">x</xsl:template>"#);
        assert_eq!(run(&xslt, "<r/>").unwrap_err().kind(), ErrorKind::Compile);
    }

    #[test]
    fn test_unknown_instruction_is_compile_error() {
        let xslt = stylesheet("", r#"<xsl:template match="/"><xsl:nonsense/></xsl:template>"#);
        assert_eq!(run(&xslt, "<r/>").unwrap_err().kind(), ErrorKind::Compile);
    }

    #[test]
    fn test_undefined_references_name_the_identifier() {
        let xslt = stylesheet("", r#"<xsl:template match="/"><xsl:value-of select="$missing_total"/></xsl:template>"#);
        let err = run(&xslt, "<r/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedReference);
        assert!(err.to_string().contains("missing_total"));

        let xslt = stylesheet("", r#"<xsl:template match="/"><xsl:call-template name="nowhere"/></xsl:template>"#);
        let err = run(&xslt, "<r/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedReference);
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_runaway_recursion_is_resource_exhaustion() {
        init_logging();
        let xslt = stylesheet(
            "",
            r#"<xsl:template match="/"><xsl:call-template name="again"/></xsl:template>
               <xsl:template name="again"><xsl:call-template name="again"/></xsl:template>"#,
        );
        let err = xsltr::transform(&xslt, "<r/>", false, false, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    }

    #[test]
    fn test_deep_legal_recursion_succeeds() -> TestResult {
        let xslt = stylesheet(
            r#"method="text""#,
            r#"<xsl:template match="/"><xsl:call-template name="sum"><xsl:with-param name="n" select="2000"/></xsl:call-template></xsl:template>
               <xsl:template name="sum">
                 <xsl:param name="n"/>
                 <xsl:param name="acc" select="0"/>
                 <xsl:choose>
                   <xsl:when test="$n = 0"><xsl:value-of select="$acc"/></xsl:when>
                   <xsl:otherwise>
                     <xsl:call-template name="sum">
                       <xsl:with-param name="n" select="$n - 1"/>
                       <xsl:with-param name="acc" select="$acc + $n"/>
                     </xsl:call-template>
                   </xsl:otherwise>
                 </xsl:choose>
               </xsl:template>"#,
        );
        assert_eq!(run(&xslt, "<r/>")?, "2001000");
        Ok(())
    }

    #[test]
    fn test_unencodable_name_is_serialization_error() {
        let xslt = stylesheet(
            r#"encoding="US-ASCII""#,
            r#"<xsl:template match="/"><xsl:element name="caf&#233;"/></xsl:template>"#,
        );
        assert_eq!(run(&xslt, "<r/>").unwrap_err().kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_failed_run_returns_no_partial_output() {
        let xslt = stylesheet(
            "",
            r#"<xsl:template match="/"><big><xsl:apply-templates select="r/i"/></big></xsl:template>
               <xsl:template match="i">
                 <item><xsl:value-of select="."/></item>
                 <xsl:if test=". = 3"><xsl:message terminate="yes">stop at three</xsl:message></xsl:if>
               </xsl:template>"#,
        );
        let result = run(&xslt, "<r><i>1</i><i>2</i><i>3</i><i>4</i></r>");
        match result {
            Ok(partial) => panic!("expected failure, got output {:?}", partial),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Runtime);
                assert!(e.to_string().contains("stop at three"));
            }
        }
    }

    #[test]
    fn test_missing_import_is_resource_fetch_error() {
        let xslt = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
            <xsl:import href="not-there.xsl"/>
        </xsl:stylesheet>"#;
        let err = run(xslt, "<r/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceFetch);
    }
}

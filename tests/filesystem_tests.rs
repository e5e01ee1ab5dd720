mod common;

use common::{TestResult, init_logging};
use std::fs;
use std::sync::Arc;
use xsltr::{ErrorKind, FilesystemResourceProvider, TransformOptions};

fn options_for(dir: &std::path::Path) -> TransformOptions {
    TransformOptions::new(true, true, false)
        .with_resource_provider(Arc::new(FilesystemResourceProvider::new(dir)))
}

#[test]
fn test_imports_includes_and_entities_from_disk() -> TestResult {
    init_logging();
    let dir = tempfile::tempdir()?;
    fs::create_dir(dir.path().join("xsl"))?;
    fs::write(
        dir.path().join("xsl/common.xsl"),
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
            <xsl:template match="entry">[<xsl:value-of select="."/>]</xsl:template>
        </xsl:stylesheet>"#,
    )?;
    fs::write(dir.path().join("chapter.xml"), "<entry>included</entry>")?;
    fs::write(dir.path().join("doc.dtd"), r#"<!ENTITY greeting "from the subset">"#)?;

    let xslt = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:import href="xsl/common.xsl"/>
        <xsl:output method="text"/>
        <xsl:template match="/doc"><xsl:value-of select="@note"/><xsl:apply-templates/></xsl:template>
    </xsl:stylesheet>"#;
    let xml = r#"<!DOCTYPE doc SYSTEM "doc.dtd"><doc note="&greeting;" xmlns:xi="http://www.w3.org/2001/XInclude"><entry>inline</entry><xi:include href="chapter.xml"/></doc>"#;

    let out = xsltr::transform_with_options(xslt, xml, &options_for(dir.path()))?;
    assert_eq!(out, "from the subset[inline][included]");
    Ok(())
}

#[test]
fn test_paths_outside_the_base_are_refused() -> TestResult {
    init_logging();
    let outer = tempfile::tempdir()?;
    let base = outer.path().join("base");
    fs::create_dir(&base)?;
    fs::write(outer.path().join("secret.xml"), "<secret/>")?;

    let xslt = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:template match="/"><xsl:copy-of select="."/></xsl:template>
    </xsl:stylesheet>"#;
    let xml = r#"<doc xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="../secret.xml"/></doc>"#;
    let err = xsltr::transform_with_options(xslt, xml, &options_for(&base)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceFetch);
    Ok(())
}

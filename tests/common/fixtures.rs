//! Stylesheets and documents shared by the integration tests.

pub const COUNT_STYLESHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:template match="/"><out><xsl:value-of select="count(//a)"/></out></xsl:template>
</xsl:stylesheet>"#;

pub const IDENTITY_STYLESHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:template match="@*|node()">
        <xsl:copy><xsl:apply-templates select="@*|node()"/></xsl:copy>
    </xsl:template>
</xsl:stylesheet>"#;

pub const CATALOG: &str = r#"<catalog xmlns:m="urn:meta">
    <book id="b1" m:lang="en"><title>Rust &amp; XML</title><price>39.50</price></book>
    <book id="b2"><title>Trees</title><price>12</price><!-- discounted --></book>
    <?render mode="full"?>
    <book id="b3"><title>Streams &lt;2nd ed.&gt;</title><price>7.25</price></book>
</catalog>"#;

/// Sorts books by price and numbers them; exercises sort, number, keys and formatting.
pub const REPORT_STYLESHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:output method="text"/>
    <xsl:key name="by-id" match="book" use="@id"/>
    <xsl:template match="/">
        <xsl:for-each select="catalog/book">
            <xsl:sort select="price" data-type="number"/>
            <xsl:number value="position()" format="i"/>
            <xsl:text>. </xsl:text>
            <xsl:value-of select="title"/>
            <xsl:text>: </xsl:text>
            <xsl:value-of select="format-number(price, '0.00')"/>
            <xsl:text>&#10;</xsl:text>
        </xsl:for-each>
        <xsl:value-of select="key('by-id', 'b2')/title"/>
    </xsl:template>
</xsl:stylesheet>"#;

pub const REPORT_OUTPUT: &str = "i. Streams <2nd ed.>: 7.25\nii. Trees: 12.00\niii. Rust & XML: 39.50\nTrees";

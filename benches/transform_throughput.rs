//! Transformation throughput benchmarks
//!
//! Measures compiled-stylesheet reuse against the one-shot call with varying:
//! - Record counts (10, 100, 1000)
//! - Stylesheet shapes (identity copy, sorted report)
//!
//! Run benchmarks: `cargo bench --bench transform_throughput`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use xsltr::{TransformOptions, Transformer};

const IDENTITY: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:template match="@*|node()"><xsl:copy><xsl:apply-templates select="@*|node()"/></xsl:copy></xsl:template>
</xsl:stylesheet>"#;

const REPORT: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:output method="html"/>
    <xsl:key name="by-group" match="record" use="@group"/>
    <xsl:template match="/">
        <html><body><table>
            <xsl:for-each select="records/record">
                <xsl:sort select="@value" data-type="number" order="descending"/>
                <tr>
                    <td><xsl:number value="position()"/></td>
                    <td><xsl:value-of select="name"/></td>
                    <td><xsl:value-of select="format-number(@value, '#,##0.00')"/></td>
                    <td><xsl:value-of select="count(key('by-group', @group))"/></td>
                </tr>
            </xsl:for-each>
        </table></body></html>
    </xsl:template>
</xsl:stylesheet>"#;

/// Generate a source document with `count` records
fn generate_records(count: usize) -> String {
    let mut xml = String::from("<records>");
    for i in 0..count {
        xml.push_str(&format!(
            r#"<record id="r{i}" group="g{}" value="{}"><name>Record {i}</name></record>"#,
            i % 7,
            (i * 37) % 1000
        ));
    }
    xml.push_str("</records>");
    xml
}

fn bench_compiled_reuse(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = c.benchmark_group("compiled_reuse");
    for (name, xslt) in [("identity", IDENTITY), ("report", REPORT)] {
        let transformer = match Transformer::compile(xslt, &TransformOptions::default()) {
            Ok(t) => t,
            Err(e) => panic!("benchmark stylesheet failed to compile: {}", e),
        };
        for count in [10usize, 100, 1000] {
            let xml = generate_records(count);
            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(BenchmarkId::new(name, count), &xml, |b, xml| {
                b.iter(|| black_box(transformer.transform(xml)))
            });
        }
    }
    group.finish();
}

fn bench_one_shot(c: &mut Criterion) {
    let mut group = c.benchmark_group("one_shot");
    for count in [10usize, 100] {
        let xml = generate_records(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("report", count), &xml, |b, xml| {
            b.iter(|| black_box(xsltr::transform(REPORT, xml, false, false, false)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compiled_reuse, bench_one_shot);
criterion_main!(benches);

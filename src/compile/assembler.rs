use super::emitter::groovy_single_quote;

/// The prepared sections of one script, in their final order.
#[derive(Debug, Clone, Default)]
pub(super) struct ScriptSections {
    pub run_name: String,
    pub output_dir: String,
    /// Source channel declarations, one statement per line.
    pub channel_declarations: Vec<String>,
    /// Rendered process definition blocks, node discovery order.
    pub process_blocks: Vec<String>,
    /// Dependency-ordered workflow statements, publish group last.
    pub workflow_statements: Vec<String>,
}

/// Concatenates the sections into the final script text.
///
/// The layout is fixed: header, parameter defaults, process definitions,
/// workflow block. Every value that varies per launch is a parameter with a
/// script-side default, so the same graph always assembles to the same bytes.
pub(super) fn assemble(sections: &ScriptSections) -> String {
    let mut script = String::new();
    script.push_str("#!/usr/bin/env nextflow\n");
    script.push_str("nextflow.enable.dsl = 2\n\n");

    script.push_str(&format!(
        "params.run_name = {}\n",
        groovy_single_quote(&sections.run_name)
    ));
    script.push_str(&format!(
        "params.outdir = {}\n",
        groovy_single_quote(&sections.output_dir)
    ));
    // Time-derived values resolve when the engine starts, not when we compile.
    script.push_str("params.stamp = new Date().format('yyyyMMdd_HHmmss')\n");
    script.push_str("params.day = new Date().format('yyyy-MM-dd')\n");

    for block in &sections.process_blocks {
        script.push('\n');
        script.push_str(block);
        if !block.ends_with('\n') {
            script.push('\n');
        }
    }

    script.push_str("\nworkflow {\n");
    for declaration in &sections.channel_declarations {
        script.push_str(&format!("    {}\n", declaration));
    }
    if !sections.channel_declarations.is_empty() && !sections.workflow_statements.is_empty() {
        script.push('\n');
    }
    for statement in &sections.workflow_statements {
        script.push_str(&format!("    {}\n", statement));
    }
    script.push_str("}\n");
    script
}

//! Table formatting utilities for CLI output.

use comfy_table::{presets, ContentArrangement, Table};
use stg::interpreter::Event;
use stg::{CompiledTemplate, Trace};

/// Format the instruction stream of one compiled template. Subtemplates
/// are listed by the caller.
pub fn format_listing_table(template: &CompiledTemplate) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_BORDERS_ONLY);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Addr", "Instruction", "Operands", "Source"]);

    for (addr, instr) in template.code().iter().enumerate() {
        let source = template
            .span_of(addr)
            .and_then(|range| template.source().get(range))
            .map(|text| text.escape_debug().to_string())
            .unwrap_or_default();
        table.add_row(vec![
            format!("{addr:04}"),
            instr.mnemonic().to_string(),
            template.operands(*instr),
            source,
        ]);
    }

    table
}

/// Format the frames of a traced render as an indented invocation tree.
pub fn format_trace_table(trace: &Trace) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_BORDERS_ONLY);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Template", "Output", "Writes", "Early"]);

    for frame in trace.frames() {
        let output = frame
            .events()
            .iter()
            .find_map(|event| match event {
                Event::Template(done) => Some(format!("{}..{}", done.output.start, done.output.end)),
                Event::Expr(_) => None,
            })
            .unwrap_or_default();
        let writes = frame
            .events()
            .iter()
            .filter(|event| matches!(event, Event::Expr(_)))
            .count();
        table.add_row(vec![
            format!("{}{}", "  ".repeat(frame.depth()), frame.template()),
            output,
            writes.to_string(),
            if frame.early_eval() { "yes" } else { "" }.to_string(),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use stg::{Formals, Group, Interpreter};

    use super::*;

    #[test]
    fn listing_has_a_row_per_instruction() {
        let mut group = Group::new("test");
        group.define("t", Formals::Open, "a<b>").unwrap();
        let template = group.lookup("t").unwrap();
        let table = format_listing_table(&template);
        assert_eq!(table.row_iter().count(), template.code().len());
        let rendered = table.to_string();
        assert!(rendered.contains("load_attr"));
        assert!(rendered.contains("<b>"));
    }

    #[test]
    fn trace_table_indents_by_depth() {
        let mut group = Group::new("test");
        group.define("inner", Formals::Open, "x").unwrap();
        group.define("outer", Formals::Open, "[<inner()>]").unwrap();
        let st = group.instance_of("outer").unwrap();
        let trace = Interpreter::default().trace(&st);
        let rendered = format_trace_table(&trace).to_string();
        assert!(rendered.contains("  inner"));
        assert!(rendered.contains("0..3"));
    }
}

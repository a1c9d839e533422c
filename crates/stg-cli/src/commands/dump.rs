//! Implementation of the `stg dump` command.

use std::path::Path;
use std::sync::Arc;

use miette::Result;
use stg::{CollectingListener, CompiledTemplate};

use crate::commands::load;
use crate::output::report;
use crate::output::table::format_listing_table;

/// Arguments for the dump command.
#[derive(Debug, clap::Args)]
pub struct DumpArgs {
    /// Name of the template to disassemble
    #[arg(short, long, required = true)]
    pub template: String,

    /// Print the plain listing instead of tables
    #[arg(long)]
    pub raw: bool,
}

fn print_tables(template: &CompiledTemplate) {
    println!("{}:", template.name());
    println!("{}", format_listing_table(template));
    for sub in template.subtemplates() {
        print_tables(sub);
    }
}

/// Run the dump command.
pub fn run_dump(dir: &Path, args: DumpArgs) -> Result<i32> {
    let listener = Arc::new(CollectingListener::new());
    let group = match load(dir, listener.clone()) {
        Ok(group) => group,
        Err(code) => return Ok(code),
    };

    match group.lookup(&args.template) {
        Ok(template) => {
            if args.raw {
                print!("{}", template.disassemble());
            } else {
                print_tables(&template);
            }
            Ok(exitcode::OK)
        }
        Err(e) => {
            for diagnostic in listener.take() {
                eprintln!("{:?}", report(&diagnostic, &group));
            }
            eprintln!("{e}");
            Ok(exitcode::DATAERR)
        }
    }
}

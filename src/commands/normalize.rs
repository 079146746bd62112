use crate::commands::common::{Common, CommonArgs};
use camino::Utf8PathBuf;
use clap::Parser;
use dep_observatory::Result;
use dep_observatory::model::TaskKind;
use dep_observatory::normalize::{postprocess, read_rows};
use ohno::IntoAppError;
use std::fs::File;
use std::io::BufReader;

#[derive(Parser, Debug)]
pub struct NormalizeArgs {
    /// JSON lines of captured package-manager tasks
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: Utf8PathBuf,

    /// Task kinds to normalize [default: list_metadata and audit]
    #[arg(long = "task", value_name = "KIND")]
    pub tasks: Vec<TaskKind>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn process_normalize(args: &NormalizeArgs) -> Result<()> {
    let common = Common::new(&args.common)?;

    let file = File::open(&args.input).into_app_err_with(|| format!("unable to open input file '{}'", args.input))?;
    let rows = read_rows(BufReader::new(file))?;

    let kinds = if args.tasks.is_empty() {
        vec![TaskKind::ListMetadata, TaskKind::Audit]
    } else {
        args.tasks.clone()
    };

    let records = postprocess(rows, &kinds);
    let mut output = common.open_output()?;
    for record in &records {
        output.write(record)?;
    }
    output.finish()?;

    log::info!("Normalized {} task groups from '{}'", records.len(), args.input);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kinds_parse_from_command_line() {
        let args = NormalizeArgs::try_parse_from(["normalize", "-i", "tasks.jsonl", "--task", "audit", "--task", "list_metadata"]).unwrap();
        assert_eq!(args.tasks, vec![TaskKind::Audit, TaskKind::ListMetadata]);

        assert!(NormalizeArgs::try_parse_from(["normalize", "-i", "tasks.jsonl", "--task", "lint"]).is_err());
    }
}

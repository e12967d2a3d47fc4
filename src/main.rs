use anyhow::anyhow;
use argh::FromArgs;
use mend::builder::{Builder, Toolchain};
use mend::work::Work;
use std::path::Path;

#[derive(FromArgs)]
/// compile and link a program, rebuilding only what is out of date.
struct Args {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// output program path [default=a.out]
    #[argh(option, short = 'o', default = "String::from(\"a.out\")")]
    output: String,

    /// extra flags passed to each compile
    #[argh(option, default = "String::new()")]
    cflags: String,

    /// source files to compile and link
    #[argh(positional)]
    sources: Vec<String>,
}

fn run() -> anyhow::Result<i32> {
    let args: Args = argh::from_env();

    if let Some(dir) = &args.chdir {
        let dir = Path::new(dir);
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {:?}: {}", dir, err))?;
    }
    if args.sources.is_empty() {
        anyhow::bail!("no source files given");
    }

    let toolchain = Toolchain::from_env();
    let mut builder = Builder::new();
    builder.program(&toolchain, &args.output, &args.sources, &args.cflags)?;
    let mut graph = builder.into_graph();

    let mut work = Work::new(&mut graph);
    Ok(match work.run()? {
        None => {
            // Don't print any summary, the failing task is enough info.
            1
        }
        Some(0) => {
            // Special case: don't print numbers when no work done.
            println!("mend: no work to do");
            0
        }
        Some(n) => {
            println!("mend: ran {} tasks, now up to date", n);
            0
        }
    })
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            println!("mend: error: {}", err);
            1
        }
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

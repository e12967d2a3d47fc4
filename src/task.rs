//! Rebuild actions: the commands that regenerate out-of-date files.
//! Unaware of the build graph; just command execution.

use std::io::Write;

/// Read-only view of a node, handed to its rebuild action.  Exposes enough
/// to synthesize a command line referencing the node's inputs.
pub struct FileView<'a> {
    /// Path of the file the action regenerates.
    pub name: &'a str,
    /// Paths of the node's dependencies, in edge order.
    pub deps: Vec<&'a str>,
}

/// The result of executing a rebuild action.
#[derive(Debug)]
pub struct TaskResult {
    pub success: bool,
    /// Console output.
    pub output: Vec<u8>,
}

/// A capability that regenerates one file.  The engine never interprets the
/// action's side effects; it only propagates the reported outcome.
pub trait RebuildAction: Send + Sync {
    fn run(&self, file: &FileView) -> TaskResult;
}

impl<F> RebuildAction for F
where
    F: Fn(&FileView) -> TaskResult + Send + Sync,
{
    fn run(&self, file: &FileView) -> TaskResult {
        self(file)
    }
}

/// Rebuild action that runs a shell command, with `$out` and `$in` expanded
/// from the node's view.  Reports the command when it starts and its captured
/// output when it fails; the scheduler itself never prints.
pub struct CommandAction {
    cmdline: String,
}

impl CommandAction {
    pub fn new(cmdline: impl Into<String>) -> Self {
        CommandAction {
            cmdline: cmdline.into(),
        }
    }
}

impl RebuildAction for CommandAction {
    fn run(&self, file: &FileView) -> TaskResult {
        let cmdline = expand(&self.cmdline, file);
        println!("{}", cmdline);
        let result = run_command(&cmdline).unwrap_or_else(|err| TaskResult {
            success: false,
            output: err.to_string().into_bytes(),
        });
        if !result.success {
            let _ = std::io::stderr().write_all(&result.output);
        }
        result
    }
}

/// Plain substring expansion; `$in` is the dependency list joined by spaces.
fn expand(cmdline: &str, file: &FileView) -> String {
    cmdline
        .replace("$in", &file.deps.join(" "))
        .replace("$out", file.name)
}

/// Executes a command line as a subprocess.
/// Returns an Err() if we failed outside of the process itself.
fn run_command(cmdline: &str) -> std::io::Result<TaskResult> {
    let mut cmd = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(cmdline)
        .output()?;
    let mut output = Vec::new();
    output.append(&mut cmd.stdout);
    output.append(&mut cmd.stderr);
    let success = cmd.status.success();

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if !success {
            if let Some(sig) = cmd.status.signal() {
                match sig {
                    libc::SIGINT => write!(output, "interrupted").unwrap(),
                    _ => write!(output, "signal {}", sig).unwrap(),
                }
            }
        }
    }

    Ok(TaskResult { success, output })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_out_and_in() {
        let view = FileView {
            name: "prog",
            deps: vec!["a.o", "b.o"],
        };
        assert_eq!(expand("cc $in -o $out", &view), "cc a.o b.o -o prog");
    }

    #[test]
    fn expand_no_placeholders() {
        let view = FileView {
            name: "out",
            deps: vec![],
        };
        assert_eq!(expand("touch stamp", &view), "touch stamp");
    }

    #[test]
    fn command_success_and_failure() {
        let view = FileView {
            name: "out",
            deps: vec![],
        };
        assert!(CommandAction::new("true").run(&view).success);
        assert!(!CommandAction::new("false").run(&view).success);
    }

    #[test]
    fn command_captures_output() {
        let result = run_command("echo hello").unwrap();
        assert!(result.success);
        assert_eq!(result.output, b"hello\n");
    }

    #[test]
    fn closure_as_action() {
        let action = |file: &FileView| TaskResult {
            success: file.deps.is_empty(),
            output: Vec::new(),
        };
        let view = FileView {
            name: "x",
            deps: vec![],
        };
        assert!(RebuildAction::run(&action, &view).success);
    }
}

//! Convenience layer for assembling a graph: deduplicates named files and
//! wires source lists into compile and link nodes.

use crate::graph::{FileId, Graph};
use crate::task::{CommandAction, RebuildAction};
use anyhow::bail;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Compiler commands, discovered from the environment.
pub struct Toolchain {
    pub cc: String,
    pub cxx: String,
    pub nvcc: String,
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

impl Toolchain {
    pub fn from_env() -> Toolchain {
        Toolchain {
            cc: env_or("CC", "cc"),
            cxx: env_or("CXX", "c++"),
            nvcc: env_or("NVCC", "nvcc"),
        }
    }

    /// The compiler for a source file, judged by extension.
    pub fn compiler_for(&self, source: &str) -> Option<&str> {
        match Path::new(source).extension()?.to_str()? {
            "c" => Some(self.cc.as_str()),
            "cc" | "cpp" | "cxx" => Some(self.cxx.as_str()),
            "cu" => Some(self.nvcc.as_str()),
            _ => None,
        }
    }
}

/// Builds up a graph, keeping one node per file name.
#[derive(Default)]
pub struct Builder {
    graph: Graph,
    by_name: FxHashMap<String, FileId>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// The node for a file name, registering a source node on first sight.
    pub fn source(&mut self, name: &str) -> FileId {
        match self.by_name.get(name) {
            Some(&id) => id,
            None => {
                let id = self.graph.add_source(name);
                self.by_name.insert(name.to_string(), id);
                id
            }
        }
    }

    /// Registers a target with an arbitrary rebuild action.  A second rule
    /// producing the same output is an error.
    pub fn target(
        &mut self,
        out: &str,
        ins: &[&str],
        action: Box<dyn RebuildAction>,
    ) -> anyhow::Result<FileId> {
        if self.by_name.contains_key(out) {
            bail!("duplicate rule for {}", out);
        }
        let deps: Vec<FileId> = ins.iter().map(|name| self.source(name)).collect();
        let id = self.graph.add_node(out, deps, action);
        self.by_name.insert(out.to_string(), id);
        Ok(id)
    }

    /// Registers a target rebuilt by a shell command; `$out` and `$in` in
    /// the command expand to the output and input paths.
    pub fn command(&mut self, out: &str, ins: &[&str], cmdline: &str) -> anyhow::Result<FileId> {
        self.target(out, ins, Box::new(CommandAction::new(cmdline)))
    }

    /// Wires compile and link nodes for a program: one object per source,
    /// then a link step over all the objects.
    pub fn program(
        &mut self,
        toolchain: &Toolchain,
        output: &str,
        sources: &[String],
        cflags: &str,
    ) -> anyhow::Result<FileId> {
        if sources.is_empty() {
            bail!("no sources for {}", output);
        }
        let mut objects = Vec::new();
        let mut linker = &toolchain.cc;
        for source in sources {
            let compiler = match toolchain.compiler_for(source) {
                Some(compiler) => compiler,
                None => bail!("don't know how to compile {}", source),
            };
            // Link with the most demanding compiler seen among the sources.
            if compiler == &toolchain.nvcc {
                linker = &toolchain.nvcc;
            } else if compiler == &toolchain.cxx && linker != &toolchain.nvcc {
                linker = &toolchain.cxx;
            }
            let object = Path::new(source).with_extension("o");
            let object = match object.to_str() {
                Some(object) => object.to_string(),
                None => bail!("non-utf8 path {}", source),
            };
            let cmdline = if cflags.is_empty() {
                format!("{} -c $in -o $out", compiler)
            } else {
                format!("{} {} -c $in -o $out", compiler, cflags)
            };
            self.command(&object, &[source.as_str()], &cmdline)?;
            objects.push(object);
        }
        let object_names: Vec<&str> = objects.iter().map(|name| name.as_str()).collect();
        let cmdline = format!("{} $in -o $out", linker);
        let id = self.command(output, &object_names, &cmdline)?;
        Ok(id)
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }
}

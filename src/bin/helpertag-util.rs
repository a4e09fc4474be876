//! helpertag command-line tool.

use anyhow::{bail, Context, Result};
use helpertag::pass::PassRegistry;
use helpertag::passes::tag_helpers;
use helpertag::{
    call_by_name, plugin, ConstVal, HostEnv, InterpContext, InterpResult, Module, MultiVal, Type,
};
use log::debug;
use smallvec::smallvec;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "helpertag-util", about = "Helper-tagging pass utility.")]
struct Options {
    #[structopt(short, long)]
    debug: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(name = "print-ir", about = "Parse textual IR and print it back")]
    PrintIR {
        #[structopt(help = "IR file to parse")]
        ir: PathBuf,
    },
    #[structopt(name = "opt", about = "Run passes over textual IR")]
    Opt {
        #[structopt(help = "IR file to transform")]
        ir: PathBuf,
        #[structopt(long = "pass", help = "Pass to run (repeatable, in order)")]
        passes: Vec<String>,
        #[structopt(long, help = "Run the standard pipeline after any explicit passes")]
        standard: bool,
        #[structopt(short, long, help = "Output file (default: stdout)")]
        output: Option<PathBuf>,
    },
    #[structopt(name = "list-passes", about = "List registered passes")]
    ListPasses,
    #[structopt(name = "run", about = "Interpret a function")]
    Run {
        #[structopt(help = "IR file to load")]
        ir: PathBuf,
        #[structopt(help = "Name of the function to call")]
        func: String,
        #[structopt(help = "Integer arguments", allow_hyphen_values = true)]
        args: Vec<i64>,
        #[structopt(long, help = "Run the helper-tagging pass first")]
        tag: bool,
        #[structopt(long, help = "Execution fuel (blocks executed)")]
        fuel: Option<u64>,
    },
}

/// Host for `run`: prints tags to stdout, like the runtime support
/// routine linked into instrumented binaries.
struct PrintHost;

impl HostEnv for PrintHost {
    fn call_import(
        &mut self,
        module: &Module,
        name: &str,
        args: &[ConstVal],
    ) -> Result<MultiVal> {
        match (name, args) {
            (tag_helpers::TAG_CALLEE, &[ConstVal::Ptr(s)]) => {
                let tag = module.string(s);
                println!("{}", tag);
                Ok(smallvec![ConstVal::I32(tag.len() as u32)])
            }
            _ => bail!("no host implementation of `{}` for args {:?}", name, args),
        }
    }
}

fn load(path: &Path) -> Result<Module> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    debug!("Loaded {} bytes of IR text", text.len());
    Module::from_text(&text).with_context(|| format!("parsing {}", path.display()))
}

fn registry() -> Result<PassRegistry> {
    let mut registry = PassRegistry::new();
    registry.load_plugin(&plugin::descriptor())?;
    Ok(registry)
}

fn main() -> Result<()> {
    let opts = Options::from_args();

    let mut logger = env_logger::Builder::from_default_env();
    if opts.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    match opts.command {
        Command::PrintIR { ir } => {
            let module = load(&ir)?;
            print!("{}", module.display());
        }
        Command::Opt {
            ir,
            passes,
            standard,
            output,
        } => {
            let mut module = load(&ir)?;
            let registry = registry()?;
            let mut pm = registry.pipeline(&passes[..])?;
            if standard {
                let mut std_pm = registry.standard_pipeline();
                let modified = pm.run(&mut module) | std_pm.run(&mut module);
                debug!("pipeline modified={}", modified);
            } else {
                if pm.is_empty() {
                    bail!("no passes given; use --pass NAME or --standard");
                }
                let modified = pm.run(&mut module);
                debug!("pipeline modified={}", modified);
            }
            let text = format!("{}", module.display());
            match output {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{}", text),
            }
        }
        Command::ListPasses => {
            let registry = registry()?;
            for info in registry.passes() {
                println!("{:<20} {}", info.name, info.description);
            }
        }
        Command::Run {
            ir,
            func,
            args,
            tag,
            fuel,
        } => {
            let mut module = load(&ir)?;
            if tag {
                tag_helpers::run(&mut module);
            }
            let target = match module.func_by_name(&func) {
                Some(f) => f,
                None => bail!("no function named `{}`", func),
            };
            let params = module.signature(module.funcs[target].sig()).params.clone();
            if params.len() != args.len() {
                bail!("`{}` takes {} argument(s), given {}", func, params.len(), args.len());
            }
            let args = params
                .iter()
                .zip(args.iter())
                .map(|(ty, &arg)| match ty {
                    Type::I32 => Ok(ConstVal::I32(arg as u32)),
                    Type::I64 => Ok(ConstVal::I64(arg as u64)),
                    Type::Ptr => bail!("cannot pass a pointer argument from the command line"),
                })
                .collect::<Result<Vec<_>>>()?;
            let mut ctx = match fuel {
                Some(fuel) => InterpContext::with_fuel(fuel),
                None => InterpContext::new(),
            };
            match call_by_name(&mut ctx, &module, &mut PrintHost, &func, &args[..])? {
                InterpResult::Ok(vals) => {
                    let vals = vals.iter().map(|v| format!("{}", v)).collect::<Vec<_>>();
                    println!("=> {}", vals.join(", "));
                }
                other => bail!("execution failed: {:?}", other),
            }
        }
    }

    Ok(())
}

use std::{env, fs, path::Path};

use tracing_subscriber::EnvFilter;

use formc::bytecode::disasm::print_func;
use formc::bytecode::{Compiler, CompilerConfig, InstrSet, Ir, Lap};
use formc::lang::form::{BinOp, Block, Expr, FuncDecl, NumKind, Stmt};

struct Options {
    isa: String,
    out: Option<String>,
    write_demo: Option<String>,
    config: CompilerConfig,
}

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return;
    }

    let mut config = CompilerConfig::default();
    if args.contains(&"--verify".to_string()) {
        config.verify = true;
    }
    if args.contains(&"--no-verify".to_string()) {
        config.verify = false;
    }

    let opts = Options {
        isa: flag_value(&args, "--isa").unwrap_or_else(|| "lap".to_string()),
        out: flag_value(&args, "--out"),
        write_demo: flag_value(&args, "--write-demo"),
        config,
    };

    if let Some(path) = &opts.write_demo {
        write_demo(path);
        return;
    }

    // first non-flag argument that is not a flag value is the input file
    let filename = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, a)| !a.starts_with('-') && !is_flag_value(&args, *i))
        .map(|(_, a)| a.clone());

    let decls = match filename {
        Some(filename) => vec![load_decl(&filename)],
        None => {
            println!("demo mode");
            demo_decls()
        }
    };

    match opts.isa.as_str() {
        "lap" => compile_all(Lap, &decls, &opts),
        "ir" => compile_all(Ir, &decls, &opts),
        other => {
            eprintln!("Error: unknown instruction set '{}', expected lap or ir", other);
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("FORMC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn is_flag_value(args: &[String], i: usize) -> bool {
    i > 0 && matches!(args[i - 1].as_str(), "--isa" | "--out" | "--write-demo")
}

fn print_usage() {
    println!("FORMC - form tree to stack bytecode compiler");
    println!();
    println!("Usage:");
    println!("  formc                        Compile the built-in demo functions");
    println!("  formc <decl.bin>             Compile a postcard-encoded function declaration");
    println!("  formc --isa lap|ir ...       Select the target instruction set (default: lap)");
    println!("  formc <decl.bin> --out <f>   Also write the compiled function to <f>");
    println!("  formc --write-demo <f>       Write a sample declaration to <f>");
    println!("  formc --verify|--no-verify   Force the stack checker on or off");
    println!("  formc --help, -h             Show this help");
    println!();
    println!("Set FORMC_LOG (e.g. FORMC_LOG=formc=trace) to see emitted instructions.");
}

fn load_decl(filename: &str) -> FuncDecl {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            std::process::exit(1);
        }
    };

    match FuncDecl::from_bytes(&bytes) {
        Ok(decl) => decl,
        Err(e) => {
            eprintln!("Decode error in '{}': {}", filename, e);
            std::process::exit(1);
        }
    }
}

fn write_demo(path: &str) {
    let decl = countdown();
    let bytes = match decl.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Encode error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = fs::write(Path::new(path), bytes) {
        eprintln!("Failed to write '{}': {}", path, e);
        std::process::exit(1);
    }
    println!("wrote '{}' to {}", decl.name, path);
}

fn compile_all<I: InstrSet + Clone>(isa: I, decls: &[FuncDecl], opts: &Options) {
    for decl in decls {
        let func = match Compiler::with_config(isa.clone(), opts.config.clone()).compile_decl(decl)
        {
            Ok(func) => func,
            Err(e) => {
                eprintln!("Compile error in '{}': {}", decl.name, e);
                std::process::exit(1);
            }
        };

        print_func(&isa, &func);
        println!();

        if let Some(out) = &opts.out {
            let written = func
                .to_bytes()
                .map_err(|e| e.to_string())
                .and_then(|bytes| fs::write(out, bytes).map_err(|e| e.to_string()));
            if let Err(e) = written {
                eprintln!("Failed to write '{}': {}", out, e);
                std::process::exit(1);
            }
        }
    }
}

// =============================================================================
// Demo functions
// =============================================================================

fn demo_decls() -> Vec<FuncDecl> {
    vec![countdown(), abs(), greet()]
}

/// `func countdown(n) { sum := 0; for n > 0 { sum = sum + n; n = n - 1 }; return sum }`
fn countdown() -> FuncDecl {
    let n = || Expr::var("n");
    let sum = || Expr::var("sum");

    FuncDecl {
        name: "countdown".to_string(),
        params: vec!["n".to_string()],
        body: vec![
            Stmt::bind("sum", Expr::Int(0)),
            Stmt::While {
                test: Expr::binary(BinOp::Gt, NumKind::Int, n(), Expr::Int(0)),
                body: Block::new(vec![
                    Stmt::rebind("sum", Expr::binary(BinOp::Add, NumKind::Int, sum(), n())),
                    Stmt::rebind("n", Expr::binary(BinOp::Sub, NumKind::Int, n(), Expr::Int(1))),
                ]),
            },
            Stmt::ret(sum()),
        ],
    }
}

/// `func abs(x float) float { if x < 0 { return -x } else { return x } }`
fn abs() -> FuncDecl {
    FuncDecl {
        name: "abs".to_string(),
        params: vec!["x".to_string()],
        body: vec![Stmt::If {
            test: Expr::binary(BinOp::Lt, NumKind::Float, Expr::var("x"), Expr::Float(0.0)),
            then: Block::new(vec![Stmt::ret(Expr::binary(
                BinOp::Sub,
                NumKind::Float,
                Expr::Float(0.0),
                Expr::var("x"),
            ))]),
            else_: Some(Box::new(Stmt::block(vec![Stmt::ret(Expr::var("x"))]))),
        }],
    }
}

/// `func greet(name string) { msg := concat("hello, ", name); print(msg) }`
fn greet() -> FuncDecl {
    FuncDecl {
        name: "greet".to_string(),
        params: vec!["name".to_string()],
        body: vec![
            Stmt::bind(
                "msg",
                Expr::call(
                    "concat",
                    vec![Expr::Str("hello, ".to_string()), Expr::var("name")],
                ),
            ),
            Stmt::call("print", vec![Expr::var("msg")]),
        ],
    }
}

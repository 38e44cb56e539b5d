use lispwright::ast::Value;
use lispwright::builtinops::find_scheme_op;
use lispwright::scheme::parse_program;
use lispwright::{Error, Runtime};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // RUST_LOG=lispwright=debug shows prelude loading and macro expansion
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("Lispwright Scheme interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Unbalanced input continues on the next line.");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let mut runtime = Runtime::new();

    // Host function callable from user code
    if let Err(err) = runtime.register_builtin::<_, ()>("help", print_help) {
        eprintln!("Could not register help: {err}");
    }

    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "lisp> " } else { "  ... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            _ = print_help().is_ok();
                            continue;
                        }
                        ":env" => {
                            print_environment(&runtime);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');

                let program = match parse_program(&pending) {
                    Ok(program) => program,
                    Err(err) if err.is_incomplete() => continue,
                    Err(err) => {
                        println!("Error: {err}");
                        pending.clear();
                        continue;
                    }
                };
                let _ = rl.add_history_entry(pending.trim_end());
                pending.clear();

                match runtime.eval(&program) {
                    // Don't print Unspecified values (e.g., from define)
                    Ok(Value::Unspecified) => {}
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                pending.clear();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() -> Result<(), Error> {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show user and library bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Discard a partially entered expression");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Examples:");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (map (lambda (x) (* x x)) '(1 2 3))");
    println!("  (call/cc (lambda (k) (+ 1 (k 42))))");
    println!("  (define-syntax swap! (syntax-rules () ((_ a b) (let ((t a)) (set! a b) (set! b t)))))");
    println!(
        "  (with-exception-handler (lambda (c) 10) (lambda () (+ 1 (raise-continuable 'oops))))"
    );
    println!();
    Ok(())
}

fn print_environment(runtime: &Runtime) {
    let user = runtime.user_scope().local_names();
    let mut special_forms = Vec::new();
    let mut procedures = Vec::new();
    let mut prelude = Vec::new();
    for name in runtime.root_scope().local_names() {
        match find_scheme_op(&name) {
            Some(op) if op.is_special_form() => special_forms.push(name),
            Some(_) => procedures.push(name),
            None => prelude.push(name),
        }
    }

    print_columns("Special forms", &special_forms);
    print_columns("Builtin procedures", &procedures);
    print_columns("Prelude definitions", &prelude);

    if user.is_empty() {
        println!("No user definitions yet.");
        return;
    }
    println!("User definitions ({}):", user.len());
    for name in user {
        if let Some(value) = runtime.get(&name) {
            println!("  {name} = {value}");
        }
    }
}

fn print_columns(title: &str, names: &[String]) {
    println!("{title} ({}):", names.len());
    let mut col = 0;
    for name in names {
        print!("  {name:<22}");
        col += 1;
        if col % 4 == 0 {
            println!();
        }
    }
    if col % 4 != 0 {
        println!();
    }
    println!();
}

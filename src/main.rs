use anyhow::Result;
use sshell::Interpreter;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut shell = Interpreter::new()?;
    let code = shell.repl()?;
    std::process::exit(code);
}

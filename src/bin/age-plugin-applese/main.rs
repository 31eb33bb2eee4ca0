use age_plugin_applese::{
    keygen, provider::SecureEnclave, run_state_machine, AccessPolicy, Error, StateMachine,
};
use gumdrop::Options;
use log::error;
use secrecy::ExposeSecret;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::process;

#[derive(Debug, Options)]
struct PluginOptions {
    #[options(help = "print help message")]
    help: bool,

    #[options(
        help = "run the given age plugin state machine",
        no_short,
        meta = "STATE-MACHINE"
    )]
    age_plugin: Option<StateMachine>,

    #[options(
        help = "access control for the generated key (default any-biometry-or-passcode)",
        no_short,
        meta = "POLICY"
    )]
    access_control: Option<AccessPolicy>,

    #[options(help = "print the recipients for the identities in INPUT", short = "y")]
    recipients: bool,

    #[options(help = "read identities from INPUT (default stdin)")]
    input: Option<String>,

    #[options(help = "output to OUTPUT (default stdout)")]
    output: Option<String>,
}

fn read_input(input: Option<String>) -> io::Result<String> {
    let mut buf = String::new();
    match input {
        Some(path) => File::open(path)?.read_to_string(&mut buf)?,
        None => io::stdin().read_to_string(&mut buf)?,
    };
    Ok(buf)
}

fn write_output(output: Option<String>, contents: &str, mode: u32) -> io::Result<()> {
    match output {
        Some(path) => {
            let mut options = OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(mode);
            }
            #[cfg(not(unix))]
            let _ = mode;
            options.open(path)?.write_all(contents.as_bytes())
        }
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(contents.as_bytes())?;
            stdout.flush()
        }
    }
}

fn run(opts: PluginOptions) -> Result<(), Error> {
    let provider = SecureEnclave;

    if let Some(state_machine) = opts.age_plugin {
        return run_state_machine(state_machine, &provider);
    }

    if opts.recipients {
        let identities = read_input(opts.input)?;
        let recipients: String = keygen::recipients(&provider, &identities)?
            .into_iter()
            .map(|recipient| recipient + "\n")
            .collect();
        write_output(opts.output, &recipients, 0o644)?;
    } else {
        let (contents, recipient) = keygen::generate(
            &provider,
            opts.access_control.unwrap_or_default(),
            chrono::Utc::now(),
        )?;
        if opts.output.is_some() {
            eprintln!("Public key: {}", recipient);
        }
        write_output(opts.output, contents.expose_secret(), 0o600)?;
    }

    Ok(())
}

fn main() {
    env_logger::builder().format_timestamp(None).init();

    let opts = PluginOptions::parse_args_default_or_exit();

    if let Err(e) = run(opts) {
        error!("{}", e);
        process::exit(1);
    }
}

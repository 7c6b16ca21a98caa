use std::env;
use std::fs;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let man_dir = out_dir.join("man").join("man1");
    let docs_dir = out_dir.join("docs");

    fs::create_dir_all(&man_dir)?;
    fs::create_dir_all(&docs_dir)?;

    // Manpage for the main command, without version so that it only changes
    // with the CLI definition
    let cmd = orion_perf_cli_types::Cli::command_without_version();
    let mut buffer: Vec<u8> = Default::default();
    clap_mangen::Man::new(cmd.clone()).render(&mut buffer)?;
    fs::write(man_dir.join("orion-perf.1"), &buffer)?;

    // One manpage per subcommand
    for subcmd in cmd.get_subcommands() {
        let mut buffer: Vec<u8> = Default::default();
        clap_mangen::Man::new(subcmd.clone()).render(&mut buffer)?;
        let subcmd_name = subcmd.get_name();
        fs::write(man_dir.join(format!("orion-perf-{subcmd_name}.1")), &buffer)?;
    }

    // Markdown documentation
    let markdown = clap_markdown::help_markdown::<orion_perf_cli_types::Cli>();
    fs::write(docs_dir.join("manpage.md"), markdown)?;

    println!("cargo:rerun-if-changed=../cli_types/src/lib.rs");

    Ok(())
}

use super::args::*;

pub mod skills;

use crate::exit_codes::SUCCESS;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let ctx = skills::RepoContext {
        repo: cli.repo,
        no_core: cli.no_core,
    };
    match cli.cmd {
        Command::Skills(args) => match args.cmd {
            SkillsSub::Compile(args) => skills::cmd_compile(&ctx, args),
            SkillsSub::Check(args) => skills::cmd_check(&ctx, args),
            SkillsSub::Import(args) => skills::cmd_import(&ctx, args),
            SkillsSub::Rules(args) => skills::cmd_rules(&ctx, args),
            SkillsSub::Evaluate(args) => skills::cmd_evaluate(&ctx, args),
        },
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}

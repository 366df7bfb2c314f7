//! Up command - terraform init + apply.

use anyhow::Result;
use tracing::info;

use terracheck_terraform::Terraform;

use super::{Context, DirArgs};

pub async fn execute(args: DirArgs, ctx: &Context) -> Result<()> {
    let options = args.to_options(ctx)?;
    info!("Applying {}", options.terraform_dir.display());

    let tf = Terraform::new(ctx.runner()?, options)?;
    let output = tf.init_and_apply().await?;

    if !ctx.stream_output && !ctx.json {
        print!("{}", output);
    }
    println!("✅ Applied {}", tf.options().terraform_dir.display());
    Ok(())
}

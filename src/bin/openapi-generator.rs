use anyhow::Context;
use mafiadon_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi();
    let json = doc
        .to_pretty_json()
        .context("serialising OpenAPI document")?;
    println!("{json}");
    Ok(())
}

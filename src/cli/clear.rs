use anyhow::{Result, anyhow};

use crate::core::config::AppConfig;
use crate::openai::Client;

const PAGE_SIZE: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Files,
    VectorStores,
    Containers,
}

impl Target {
    fn label(&self) -> &'static str {
        match self {
            Self::Files => "file",
            Self::VectorStores => "vector store",
            Self::Containers => "container",
        }
    }
}

/// Bulk-delete remote objects of one kind, skipping the given ids.
pub async fn run(config: &AppConfig, target: Target, keep: &[String]) -> Result<()> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("Missing API key: set OPENAI_API_KEY"))?;
    let client = Client::new(&config.api_hostname, &api_key);
    let deleted = clear(&client, target, keep).await?;
    println!("Deleted {} {}(s)", deleted, target.label());
    Ok(())
}

async fn clear(client: &Client, target: Target, keep: &[String]) -> Result<usize> {
    let mut deleted = 0usize;
    let mut after: Option<String> = None;

    loop {
        let page = match target {
            Target::Files => client.list_files(PAGE_SIZE, after.as_deref()).await?,
            Target::VectorStores => {
                client.list_vector_stores(PAGE_SIZE, after.as_deref()).await?
            }
            Target::Containers => client.list_containers(PAGE_SIZE, after.as_deref()).await?,
        };
        if page.data.is_empty() {
            break;
        }
        let last_id = page.data.last().map(|o| o.id.clone());

        let mut deleted_in_page = 0usize;
        for object in page.data {
            if keep.contains(&object.id) {
                continue;
            }
            match target {
                Target::Files => client.delete_file(&object.id).await?,
                Target::VectorStores => client.delete_vector_store(&object.id).await?,
                Target::Containers => client.delete_container(&object.id).await?,
            }
            println!("Deleted {}: {}", target.label(), object.id);
            deleted_in_page += 1;
        }
        deleted += deleted_in_page;

        if deleted_in_page == 0 {
            // Nothing left to delete on this page; page past the kept ids
            if !page.has_more {
                break;
            }
            after = last_id;
        } else if !page.has_more {
            break;
        } else {
            // Deleted ids are gone, so the cursor restarts from the top
            after = None;
        }
    }

    Ok(deleted)
}

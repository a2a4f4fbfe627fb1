use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use recipe_service::config::Config;
use recipe_service::models::{AttrResponse, RecipeDetail, RecipeImage, RecipeSummary};
use recipe_service::user_models::{CreateUserRequest, TokenResponse, UserResponse};
use recipe_service::user_storage::UserStorage;
use reqwest::{multipart, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SESSION_FILE: &str = ".recipe-session";

#[derive(Parser)]
#[command(name = "recipe")]
#[command(about = "A CLI tool for managing recipes", long_about = None)]
struct Cli {
    #[arg(long, global = true, env = "RECIPE_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new account")]
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        #[arg(short, long, help = "Display name")]
        name: Option<String>,
    },

    #[command(about = "Log in and remember the token")]
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    #[command(about = "Forget the stored token")]
    Logout,

    #[command(about = "Show your profile")]
    Whoami,

    #[command(about = "Change your profile")]
    Profile {
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        password: Option<String>,
    },

    #[command(about = "List your tags")]
    Tags {
        #[arg(short, long, help = "Only tags used by a recipe")]
        assigned_only: bool,
    },

    #[command(about = "Create a tag")]
    AddTag { name: String },

    #[command(about = "List your ingredients")]
    Ingredients {
        #[arg(short, long, help = "Only ingredients used by a recipe")]
        assigned_only: bool,
    },

    #[command(about = "Create an ingredient")]
    AddIngredient { name: String },

    #[command(about = "List your recipes")]
    Recipes {
        #[arg(short, long, help = "Tag ids (comma-separated)")]
        tags: Option<String>,

        #[arg(short, long, help = "Ingredient ids (comma-separated)")]
        ingredients: Option<String>,
    },

    #[command(about = "Show one recipe in full")]
    Show { id: u64 },

    #[command(about = "Create a recipe")]
    AddRecipe {
        #[arg(short = 'T', long)]
        title: String,

        #[arg(short = 'm', long, help = "Preparation time in minutes")]
        time: u32,

        #[arg(short, long, help = "Price, e.g. 5.00")]
        price: String,

        #[arg(short, long)]
        link: Option<String>,

        #[arg(short, long, help = "Tag ids (comma-separated)")]
        tags: Option<String>,

        #[arg(short, long, help = "Ingredient ids (comma-separated)")]
        ingredients: Option<String>,
    },

    #[command(about = "Change fields of a recipe")]
    EditRecipe {
        id: u64,

        #[arg(short = 'T', long)]
        title: Option<String>,

        #[arg(short = 'm', long)]
        time: Option<u32>,

        #[arg(short, long)]
        price: Option<String>,

        #[arg(short, long)]
        link: Option<String>,

        #[arg(short, long, help = "Tag ids (comma-separated)")]
        tags: Option<String>,

        #[arg(short, long, help = "Ingredient ids (comma-separated)")]
        ingredients: Option<String>,
    },

    #[command(about = "Delete a recipe")]
    DeleteRecipe { id: u64 },

    #[command(about = "Attach an image to a recipe")]
    UploadImage {
        id: u64,

        #[arg(short, long, help = "Path to the image file")]
        file: PathBuf,
    },

    #[command(about = "Create an administrator directly in the local data directory")]
    CreateSuperuser {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    email: String,
    token: String,
}

impl Session {
    fn save(&self) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(SESSION_FILE, json)?;
        Ok(())
    }

    fn load() -> Option<Self> {
        if Path::new(SESSION_FILE).exists() {
            let data = fs::read_to_string(SESSION_FILE).ok()?;
            serde_json::from_str(&data).ok()
        } else {
            None
        }
    }

    fn clear() -> Result<()> {
        if Path::new(SESSION_FILE).exists() {
            fs::remove_file(SESSION_FILE)?;
        }
        Ok(())
    }
}

struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token: Session::load().map(|s| s.token),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}/api{}", self.base, path));
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Token {token}")),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .context("Failed to connect to the recipe service. Is the server running?")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                bail!("Not logged in or token rejected. Use: recipe login -e <email> -p <password>");
            }
            bail!("Request failed ({status}): {error_text}");
        }

        response.json().await.context("Failed to parse response")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn patch<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, path)
            .send()
            .await
            .context("Failed to connect to the recipe service. Is the server running?")?;
        if !response.status().is_success() {
            bail!("Request failed ({})", response.status());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(cli).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    let api = ApiClient::new(&cli.api_url);

    match cli.command {
        Commands::Register {
            email,
            password,
            name,
        } => {
            let body = json!({ "email": email, "password": password, "name": name.unwrap_or_default() });
            let user: UserResponse = api.post("/user/create", &body).await?;
            println!("✅ Account created for {}", user.email);
            println!("💡 Log in with: recipe login -e {} -p <password>", user.email);
        }
        Commands::Login { email, password } => {
            let body = json!({ "email": email, "password": password });
            let token: TokenResponse = api.post("/user/token", &body).await?;
            Session {
                email: email.clone(),
                token: token.token,
            }
            .save()?;
            println!("✅ Logged in as {}", email);
        }
        Commands::Logout => {
            Session::clear()?;
            println!("✅ Logged out");
        }
        Commands::Whoami => {
            let user: UserResponse = api.get("/user/me").await?;
            print_user(&user);
        }
        Commands::Profile {
            name,
            email,
            password,
        } => {
            let mut body = Map::new();
            insert_some(&mut body, "name", name);
            insert_some(&mut body, "email", email);
            insert_some(&mut body, "password", password);
            if body.is_empty() {
                bail!("Nothing to change");
            }
            let user: UserResponse = api.patch("/user/me", &Value::Object(body)).await?;
            println!("✅ Profile updated");
            print_user(&user);
        }
        Commands::Tags { assigned_only } => {
            let tags: Vec<AttrResponse> = api.get(&attr_path("/recipe/tags", assigned_only)).await?;
            print_attrs("Tags", &tags);
        }
        Commands::AddTag { name } => {
            let tag: AttrResponse = api.post("/recipe/tags", &json!({ "name": name })).await?;
            println!("✅ Tag '{}' created (id {})", tag.name, tag.id);
        }
        Commands::Ingredients { assigned_only } => {
            let ingredients: Vec<AttrResponse> =
                api.get(&attr_path("/recipe/ingredients", assigned_only)).await?;
            print_attrs("Ingredients", &ingredients);
        }
        Commands::AddIngredient { name } => {
            let ingredient: AttrResponse =
                api.post("/recipe/ingredients", &json!({ "name": name })).await?;
            println!("✅ Ingredient '{}' created (id {})", ingredient.name, ingredient.id);
        }
        Commands::Recipes { tags, ingredients } => {
            let mut query = Vec::new();
            if let Some(tags) = tags {
                query.push(format!("tags={tags}"));
            }
            if let Some(ingredients) = ingredients {
                query.push(format!("ingredients={ingredients}"));
            }
            let path = if query.is_empty() {
                "/recipe/recipes".to_string()
            } else {
                format!("/recipe/recipes?{}", query.join("&"))
            };
            let recipes: Vec<RecipeSummary> = api.get(&path).await?;
            print_recipes(&recipes);
        }
        Commands::Show { id } => {
            let recipe: RecipeDetail = api.get(&format!("/recipe/recipes/{id}")).await?;
            print_recipe(&recipe);
        }
        Commands::AddRecipe {
            title,
            time,
            price,
            link,
            tags,
            ingredients,
        } => {
            let mut body = Map::new();
            body.insert("title".into(), json!(title));
            body.insert("time_minutes".into(), json!(time));
            body.insert("price".into(), json!(parse_price(&price)?));
            insert_some(&mut body, "link", link);
            insert_some(&mut body, "tags", tags.as_deref().map(parse_ids).transpose()?);
            insert_some(
                &mut body,
                "ingredients",
                ingredients.as_deref().map(parse_ids).transpose()?,
            );

            let recipe: RecipeSummary = api.post("/recipe/recipes", &Value::Object(body)).await?;
            println!("✅ Recipe '{}' created (id {})", recipe.title, recipe.id);
        }
        Commands::EditRecipe {
            id,
            title,
            time,
            price,
            link,
            tags,
            ingredients,
        } => {
            let mut body = Map::new();
            insert_some(&mut body, "title", title);
            insert_some(&mut body, "time_minutes", time);
            insert_some(&mut body, "price", price.as_deref().map(parse_price).transpose()?);
            insert_some(&mut body, "link", link);
            insert_some(&mut body, "tags", tags.as_deref().map(parse_ids).transpose()?);
            insert_some(
                &mut body,
                "ingredients",
                ingredients.as_deref().map(parse_ids).transpose()?,
            );
            if body.is_empty() {
                bail!("Nothing to change");
            }

            let recipe: RecipeSummary = api
                .patch(&format!("/recipe/recipes/{id}"), &Value::Object(body))
                .await?;
            println!("✅ Recipe '{}' updated", recipe.title);
        }
        Commands::DeleteRecipe { id } => {
            api.delete(&format!("/recipe/recipes/{id}")).await?;
            println!("✅ Recipe {} deleted", id);
        }
        Commands::UploadImage { id, file } => {
            upload_image(&api, id, &file).await?;
        }
        Commands::CreateSuperuser { email, password } => {
            create_superuser(email, password).await?;
        }
    }

    Ok(())
}

fn insert_some<T: Serialize>(body: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        body.insert(key.to_string(), json!(value));
    }
}

fn attr_path(base: &str, assigned_only: bool) -> String {
    if assigned_only {
        format!("{base}?assigned_only=1")
    } else {
        base.to_string()
    }
}

fn parse_price(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).with_context(|| format!("Invalid price: {raw}"))
}

fn parse_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("Invalid id: {s}")))
        .collect()
}

async fn upload_image(api: &ApiClient, id: u64, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }

    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let form = multipart::Form::new().part("image", multipart::Part::bytes(bytes).file_name(filename));
    let image: RecipeImage = api
        .send(
            api.request(Method::POST, &format!("/recipe/recipes/{id}/upload-image"))
                .multipart(form),
        )
        .await?;

    println!("✅ Image uploaded for recipe {}", image.id);
    if let Some(url) = image.image {
        println!("🖼️  {}", url);
    }
    Ok(())
}

/// Applies the registration rules to the offline account.
fn check_superuser(email: &str, password: &str) -> Result<()> {
    let request = CreateUserRequest {
        email: Some(email.to_string()),
        password: Some(password.to_string()),
        name: None,
    };
    if let Err(errors) = request.check() {
        bail!("Invalid superuser: {}", serde_json::to_string(&errors)?);
    }
    Ok(())
}

async fn create_superuser(email: String, password: String) -> Result<()> {
    check_superuser(&email, &password)?;

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let storage = UserStorage::open(&config.users_path(), config.bcrypt_cost)?;
    let user = storage.create_superuser(&email, &password).await?;

    println!("✅ Superuser {} created in {}", user.email, config.users_path().display());
    Ok(())
}

fn print_user(user: &UserResponse) {
    println!("👤 {}", user.email);
    if !user.name.is_empty() {
        println!("   Name: {}", user.name);
    }
}

fn print_attrs(title: &str, rows: &[AttrResponse]) {
    if rows.is_empty() {
        println!("📭 No {} found.", title.to_lowercase());
        return;
    }

    println!("\n📋 {} ({})\n", title, rows.len());
    let mut table = Table::new();
    table.add_row(Row::new(vec![Cell::new("ID"), Cell::new("Name")]));
    for row in rows {
        table.add_row(Row::new(vec![
            Cell::new(&row.id.to_string()),
            Cell::new(&row.name),
        ]));
    }
    table.printstd();
    println!();
}

fn print_recipes(recipes: &[RecipeSummary]) {
    if recipes.is_empty() {
        println!("📭 No recipes found.");
        return;
    }

    println!("\n📋 Recipes ({})\n", recipes.len());
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Minutes"),
        Cell::new("Price"),
        Cell::new("Link"),
    ]));
    for recipe in recipes {
        table.add_row(Row::new(vec![
            Cell::new(&recipe.id.to_string()),
            Cell::new(&recipe.title),
            Cell::new(&recipe.time_minutes.to_string()),
            Cell::new(&recipe.price.to_string()),
            Cell::new(if recipe.link.is_empty() { "-" } else { recipe.link.as_str() }),
        ]));
    }
    table.printstd();
    println!();
}

fn print_recipe(recipe: &RecipeDetail) {
    let names = |rows: &[AttrResponse]| {
        if rows.is_empty() {
            "-".to_string()
        } else {
            rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", ")
        }
    };

    println!("\n🍽️  {} (id {})", recipe.title, recipe.id);
    println!("   ⏰ {} minutes", recipe.time_minutes);
    println!("   💰 {}", recipe.price);
    if !recipe.link.is_empty() {
        println!("   🔗 {}", recipe.link);
    }
    println!("   🏷️  Tags: {}", names(&recipe.tags));
    println!("   🥕 Ingredients: {}", names(&recipe.ingredients));
    if let Some(image) = &recipe.image {
        println!("   🖼️  {}", image);
    }
    println!();
}

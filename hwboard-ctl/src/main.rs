use anyhow::{anyhow, Context};
use hwboard_api::{AuthToken, CleanupReport, CleanupRequest, Role, User, UserId, Uuid};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        initial_password: String,

        /// One of student, teacher or admin
        #[structopt(long, default_value = "student")]
        role: Role,

        #[structopt(long)]
        student_id: Option<String>,
    },

    /// Add the default subjects that are missing
    SeedSubjects,

    /// Delete assignments created more than `days` days ago
    CleanupAssignments {
        #[structopt(long, default_value = "90")]
        days: i64,

        /// Only list what would be deleted
        #[structopt(long)]
        dry_run: bool,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response")?;
    match hwboard_api::Error::parse(&body) {
        Ok(err) => Err(anyhow!("server refused the request: {err}")),
        Err(_) => Err(anyhow!("server answered {status}: {body:?}")),
    }
}

fn print_report(report: &CleanupReport) {
    let verb = match report.dry_run {
        true => "would delete",
        false => "deleted",
    };
    println!(
        "{verb} {} assignment(s) created before {}",
        report.assignments.len(),
        report.cutoff
    );
    for a in report.assignments.iter() {
        println!(
            "  {} {:?} ({}/{} completed, {}%)",
            a.assignment.date.date_naive(),
            a.assignment.title,
            a.completed,
            a.total,
            a.percentage
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::CreateUser {
            name,
            initial_password,
            role,
            student_id,
        } => {
            let resp = client
                .post(format!("{}/api/admin/create-user", opt.host))
                .json(&hwboard_api::NewUser::new(
                    UserId(Uuid::new_v4()),
                    name,
                    role,
                    student_id,
                    initial_password,
                ))
                .bearer_auth(admin_token()?.0)
                .send()
                .await?;
            let user: User = check(resp).await?.json().await?;
            println!("created {} {} with id {}", user.role, user.name, user.id.0);
        }
        Command::SeedSubjects => {
            let resp = client
                .post(format!("{}/api/admin/seed-subjects", opt.host))
                .bearer_auth(admin_token()?.0)
                .send()
                .await?;
            let added: usize = check(resp).await?.json().await?;
            println!("added {added} subject(s)");
        }
        Command::CleanupAssignments { days, dry_run } => {
            let resp = client
                .post(format!("{}/api/admin/cleanup-assignments", opt.host))
                .json(&CleanupRequest { days, dry_run })
                .bearer_auth(admin_token()?.0)
                .send()
                .await?;
            let report: CleanupReport = check(resp).await?.json().await?;
            print_report(&report);
        }
    }

    Ok(())
}

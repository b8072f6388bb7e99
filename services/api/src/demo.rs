use crate::infra::{
    seed_fixture_users, InMemoryCommunityStore, InMemoryEventStore, InMemoryMediaStore,
    InMemoryUserStore, TokenOverlapSimilarity,
};
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use clap::Args;
use std::sync::Arc;
use volunteer_hub::engagement::domain::{CommunityDraft, EventDraft, Schedule};
use volunteer_hub::engagement::EngagementCore;
use volunteer_hub::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Override the reporting date (defaults to today).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let events = Arc::new(InMemoryEventStore::default());
    let communities = Arc::new(InMemoryCommunityStore::default());
    let users = Arc::new(InMemoryUserStore::default());
    let similarity = Arc::new(TokenOverlapSimilarity::new(events.clone(), users.clone()));
    let core = EngagementCore::new(
        events,
        communities,
        users.clone(),
        similarity,
        Arc::new(InMemoryMediaStore::default()),
    );

    let (owner, first_volunteer, second_volunteer) = seed_fixture_users(&users);
    println!("Community engagement demo (evaluated {today})");
    println!(
        "Seeded users: {} (owner), {} and {} (volunteers)",
        owner.0, first_volunteer.0, second_volunteer.0
    );

    let community = core.integrity.create_community(
        &owner,
        CommunityDraft {
            name: "Harbor Volunteers".to_string(),
            description: "Keeps the shoreline clean".to_string(),
            image: "img-demo-community.png".to_string(),
        },
    )?;
    println!("\nCreated community {} ({})", community.name, community.id.0);

    let cleanup = core.integrity.create_event(
        &owner,
        event_draft(
            "Beach Cleanup",
            "Pick up litter along the shore, gloves and bags provided",
            today + Duration::days(7),
            &["teamwork", "first aid"],
        ),
    )?;
    let restoration = core.integrity.create_event(
        &owner,
        event_draft(
            "Harbor Restoration",
            "Move supplies and repaint the pier railings",
            today + Duration::days(14),
            &["logistics", "painting"],
        ),
    )?;
    println!(
        "Created events {} and {}; community now lists {} event ids",
        cleanup.id.0,
        restoration.id.0,
        core.queries.community(&community.id)?.events.len()
    );

    let applicant = core.applications.apply(&cleanup.id, &first_volunteer)?;
    core.applications
        .invite(&restoration.id, &owner, &second_volunteer)?;
    println!(
        "\n{} applied to {} (status {})",
        first_volunteer.0,
        cleanup.title,
        applicant.status.label()
    );
    println!("{} invited to {}", second_volunteer.0, restoration.title);

    let owner_events = core.queries.owner_events(&owner)?;
    println!("\nOwner view of the community's events:");
    match serde_json::to_string_pretty(&owner_events) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("  owner view unavailable: {err}"),
    }

    let approved = core
        .applications
        .accept(&cleanup.id, &owner, &applicant.id)?;
    println!(
        "Accepted applicant {} -> status {}",
        approved.id.0,
        approved.status.label()
    );

    let applied = core.queries.applied_events(&first_volunteer)?;
    println!("\n{} sees their applications as:", first_volunteer.0);
    match serde_json::to_string_pretty(&applied) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("  applied view unavailable: {err}"),
    }

    let ranked = core.ranking.events_by_skills(&first_volunteer, today)?;
    println!("\nEvents ranked against {}'s skills:", first_volunteer.0);
    for view in &ranked {
        println!("  - {} ({})", view.title, view.id.0);
    }

    let upcoming = core.queries.upcoming(None, today)?;
    println!(
        "\nUpcoming events, page 1: {} entr{}",
        upcoming.len(),
        if upcoming.len() == 1 { "y" } else { "ies" }
    );

    let removed = core.integrity.delete_event(&owner, &cleanup.id)?;
    println!("\nDeleted event {}", removed.id.0);
    let report = core.integrity.reconcile()?;
    println!(
        "Reconciliation after delete: relinked {}, unlinked {} (clean: {})",
        report.relinked.len(),
        report.unlinked.len(),
        report.is_clean()
    );

    Ok(())
}

fn event_draft(
    title: &str,
    description: &str,
    day: NaiveDate,
    skills: &[&str],
) -> EventDraft {
    EventDraft {
        title: title.to_string(),
        description: description.to_string(),
        schedule: Schedule {
            date: day,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).expect("valid time"),
        },
        location: "North Beach".to_string(),
        image: "img-demo-event.png".to_string(),
        targeted_skills: skills.iter().map(|skill| skill.to_string()).collect(),
        duration_minutes: Some(180),
    }
}

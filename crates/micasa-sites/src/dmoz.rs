//! Personal pages of the DMOZ programming directory.

use anyhow::Result;
use micasa_crawler::Site;
use sws_scraper::Html;

use crate::profile::SiteProfile;

pub const PROFILE: &str = include_str!("../profiles/dmoz.yaml");

pub fn site() -> Result<Site<Html>> {
    SiteProfile::from_yaml(PROFILE)?.into_site()
}

//! Built-in blocklists a fresh install is seeded with, plus the public
//! hosts files each category can be refreshed from.

use crate::rules::Category;

const ADULT: &[&str] = &[
    "pornhub.com",
    "xvideos.com",
    "xnxx.com",
    "xhamster.com",
    "redtube.com",
    "youporn.com",
    "tube8.com",
    "spankbang.com",
    "pornone.com",
    "eporner.com",
    "porn.com",
    "porntrex.com",
    "hqporner.com",
    "tnaflix.com",
    "porndig.com",
    "thumbzilla.com",
    "beeg.com",
    "motherless.com",
    "ixxx.com",
    "youjizz.com",
    "drtuber.com",
    "pornmd.com",
    "4tube.com",
    "fuq.com",
    "hentaihaven.xxx",
    "rule34.xxx",
    "gelbooru.com",
    "danbooru.donmai.us",
    "sankakucomplex.com",
    "nhentai.net",
    "hitomi.la",
    "e-hentai.org",
    "exhentai.org",
    "hanime.tv",
    "hentai2read.com",
    "onlyfans.com",
    "fansly.com",
    "chaturbate.com",
    "cam4.com",
    "myfreecams.com",
    "bongacams.com",
    "camsoda.com",
    "stripchat.com",
    "livejasmin.com",
    "flirt4free.com",
    "adultfriendfinder.com",
    "ashleymadison.com",
    "pornbb.org",
    "fapster.xxx",
];

const MALWARE: &[&str] = &[
    "malware-domain.com",
    "phishing-site.net",
    "fakemicrosoft.com",
    "fakeapple.com",
    "fakegoogle.com",
    "fakeamazon.com",
    "fakepaypal.com",
    "fakebank.com",
    "tech-support-scam.com",
    "virus-alert-fake.com",
    "free-prize-winner.com",
    "click-here-to-win.com",
    "your-computer-infected.com",
    "call-microsoft-support.com",
    "urgent-security-update.com",
    "account-verify-now.com",
    "password-reset-urgent.com",
    "suspicious-activity-alert.com",
    "irs-tax-refund.com",
    "lottery-winner-claim.com",
    "prince-inheritance.com",
    "bitcoin-doubler.com",
    "crypto-giveaway-fake.com",
    "elon-musk-btc.com",
    "free-iphone-winner.com",
    "gift-card-generator.com",
    "robux-free-generator.com",
    "vbucks-generator.com",
    "survey-rewards-fake.com",
    "claim-reward-now.net",
];

const GAMBLING: &[&str] = &[
    "bet365.com",
    "draftkings.com",
    "fanduel.com",
    "caesars.com",
    "betmgm.com",
    "pokerstars.com",
    "888casino.com",
    "betway.com",
    "williamhill.com",
    "paddypower.com",
    "bovada.lv",
    "betfair.com",
    "unibet.com",
    "bwin.com",
    "ladbrokes.com",
    "coral.co.uk",
    "stake.com",
    "roobet.com",
    "rollbit.com",
];

const SOCIAL_MEDIA: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "snapchat.com",
    "reddit.com",
    "tumblr.com",
    "pinterest.com",
    "linkedin.com",
    "discord.com",
    "discordapp.com",
    "twitch.tv",
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "weibo.com",
    "vk.com",
    "telegram.org",
    "t.me",
    "whatsapp.com",
    "messenger.com",
    "signal.org",
];

const ADULT_SOURCES: &[&str] = &[
    "https://raw.githubusercontent.com/StevenBlack/hosts/master/alternates/porn-only/hosts",
    "https://raw.githubusercontent.com/4skinSkywalker/Anti-Porn-HOSTS-File/master/HOSTS.txt",
];

const MALWARE_SOURCES: &[&str] = &[
    "https://urlhaus.abuse.ch/downloads/hostfile/",
    "https://raw.githubusercontent.com/StevenBlack/hosts/master/data/StevenBlack/hosts",
];

const GAMBLING_SOURCES: &[&str] =
    &["https://raw.githubusercontent.com/StevenBlack/hosts/master/alternates/gambling-only/hosts"];

const SOCIAL_MEDIA_SOURCES: &[&str] =
    &["https://raw.githubusercontent.com/StevenBlack/hosts/master/alternates/social-only/hosts"];

/// Built-in entries for `category`, in stored form.
///
/// Site categories list each domain together with its `*.` wildcard;
/// malware entries are exact hosts. `Custom` has no defaults.
pub fn default_domains(category: Category) -> Vec<String> {
    let (domains, wildcard) = match category {
        Category::Adult => (ADULT, true),
        Category::Malware => (MALWARE, false),
        Category::Gambling => (GAMBLING, true),
        Category::SocialMedia => (SOCIAL_MEDIA, true),
        Category::Custom => (&[][..], false),
    };

    let mut entries = Vec::with_capacity(domains.len() * 2);
    for domain in domains {
        entries.push(domain.to_string());
        if wildcard {
            entries.push(format!("*.{}", domain));
        }
    }
    entries
}

/// Whether a category's built-in entries start out enforced.
///
/// Social media is opt-in.
pub fn enabled_by_default(category: Category) -> bool {
    !matches!(category, Category::SocialMedia)
}

/// Public hosts files a category is downloaded from.
pub fn default_sources(category: Category) -> &'static [&'static str] {
    match category {
        Category::Adult => ADULT_SOURCES,
        Category::Malware => MALWARE_SOURCES,
        Category::Gambling => GAMBLING_SOURCES,
        Category::SocialMedia => SOCIAL_MEDIA_SOURCES,
        Category::Custom => &[],
    }
}

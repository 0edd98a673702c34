/// One directory query per leading character keeps each result set inside
/// the server's paging limits.
pub const USERNAME_PREFIXES: &[char] = &[
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Export column order. Consumers key on these names, do not reorder.
pub const CSV_COLUMNS: &[&str] = &[
    "Username",
    "DisplayName",
    "Department",
    "Title",
    "Email",
    "InAD",
    "AD_Enabled",
    "AD_Created",
    "AD_LastLogon",
    "AD_WhenChanged",
    "AD_PwdLastSet",
    "AD_Description",
    "AD_DistinguishedName",
    "InEntraID",
    "Entra_Enabled",
    "Entra_Created",
    "Entra_LastInteractiveSignIn",
    "Entra_LastNonInteractiveSignIn",
];

pub mod graph {

    pub const USER_SELECT_FIELDS: &str = "displayName,userPrincipalName,department,jobTitle,mail,\
        accountEnabled,createdDateTime,signInActivity";

    /// Maximum page size the users endpoint accepts.
    pub const PAGE_SIZE: u32 = 999;
}

pub mod ldap {

    pub const USER_ATTRIBUTES: &[&str] = &[
        "sAMAccountName",
        "displayName",
        "department",
        "title",
        "mail",
        "userAccountControl",
        "whenCreated",
        "lastLogonTimestamp",
        "whenChanged",
        "pwdLastSet",
        "description",
        "distinguishedName",
    ];
}
